use std::sync::Mutex;
use std::time::Duration;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyDict};

#[cfg(feature = "serial")]
use crate::transport::serial::{SerialConfig, SerialTransport};
use crate::transport::Transport;
use crate::{Chord, DeviceSession};

trait SendTransport: Transport + Send {}
impl<T: Transport + Send> SendTransport for T {}

type DynSession = DeviceSession<Box<dyn SendTransport>>;

#[pyclass(name = "CharaDevice")]
pub struct PyCharaDevice {
    inner: Mutex<DynSession>,
}

#[pymethods]
impl PyCharaDevice {
    #[staticmethod]
    #[cfg(feature = "serial")]
    #[pyo3(signature = (path, baud_rate = 115_200))]
    pub fn open_serial(path: &str, baud_rate: u32) -> PyResult<Self> {
        let config = SerialConfig::new(path).baud_rate(baud_rate);
        let transport = SerialTransport::open_with(&config).map_err(|err| {
            PyRuntimeError::new_err(format!("failed to open serial transport: {err}"))
        })?;
        let transport: Box<dyn SendTransport> = Box::new(transport);
        let mut session = DeviceSession::new(transport);
        session.set_default_timeout(config.timeout);
        Ok(Self {
            inner: Mutex::new(session),
        })
    }

    #[staticmethod]
    #[cfg(not(feature = "serial"))]
    #[pyo3(signature = (path, baud_rate = 115_200))]
    pub fn open_serial(path: &str, baud_rate: u32) -> PyResult<Self> {
        let _ = (path, baud_rate);
        Err(PyRuntimeError::new_err(
            "serial support is disabled for this build",
        ))
    }

    pub fn init(&self) -> PyResult<bool> {
        self.with_session(|session| session.init())
    }

    #[pyo3(signature = (parts, timeout = 2.0))]
    pub fn send_command(&self, parts: Vec<String>, timeout: f64) -> PyResult<Vec<String>> {
        let timeout = seconds(timeout)?;
        self.with_session(|session| session.send_command(&parts, timeout))
    }

    #[getter]
    pub fn version(&self) -> PyResult<Option<String>> {
        self.with_session(|session| session.version().map(str::to_string))
    }

    #[getter]
    pub fn key_count(&self) -> PyResult<Option<u16>> {
        self.with_session(|session| session.key_count())
    }

    #[getter]
    pub fn layer_count(&self) -> PyResult<Option<u8>> {
        self.with_session(|session| session.layer_count())
    }

    #[getter]
    pub fn profile_count(&self) -> PyResult<Option<u8>> {
        self.with_session(|session| session.profile_count())
    }

    pub fn get_chord_count(&self) -> PyResult<u32> {
        self.with_session(|session| session.chord_count())
    }

    pub fn get_ram_bytes_available(&self) -> PyResult<Option<u32>> {
        self.with_session(|session| session.ram_available())
    }

    pub fn get_setting(&self, profile: u16, setting_id: u16) -> PyResult<Option<i64>> {
        self.with_session(|session| session.setting(profile, setting_id))
    }

    pub fn get_chord<'py>(&self, py: Python<'py>, index: u32) -> PyResult<Bound<'py, PyDict>> {
        let chord = self.with_session(|session| session.chord(index))?;
        chord_to_dict(py, &chord)
    }

    #[pyo3(signature = (timeout = None))]
    pub fn query_key(&self, py: Python<'_>, timeout: Option<f64>) -> PyResult<Option<u32>> {
        let timeout = timeout.map(seconds).transpose()?;
        // An unbounded wait must not hold the interpreter.
        py.detach(|| self.with_session(|session| session.query_key(timeout)))
    }

    pub fn get_device_info<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let info = self.with_session(|session| session.device_info())?;
        let dict = PyDict::new(py);
        dict.set_item("port", info.port)?;
        dict.set_item("baudrate", info.baud_rate)?;
        dict.set_item("version", info.version)?;
        let identity = info.identity.as_ref();
        dict.set_item("company", identity.map(|id| id.company.clone()))?;
        dict.set_item("device", identity.map(|id| id.device.clone()))?;
        dict.set_item("chipset", identity.map(|id| id.chipset.clone()))?;
        dict.set_item("key_count", info.capabilities.map(|caps| caps.key_count))?;
        dict.set_item("layer_count", info.capabilities.map(|caps| caps.layer_count))?;
        dict.set_item("profile_count", info.capabilities.map(|caps| caps.profile_count))?;
        dict.set_item("is_connected", info.is_connected)?;
        Ok(dict)
    }

    pub fn close(&self) -> PyResult<()> {
        self.with_session(|session| session.close())
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    fn __exit__(
        &self,
        _exc_type: &Bound<'_, PyAny>,
        _exc_value: &Bound<'_, PyAny>,
        _traceback: &Bound<'_, PyAny>,
    ) -> PyResult<bool> {
        self.close()?;
        Ok(false)
    }
}

impl PyCharaDevice {
    fn with_session<R>(&self, f: impl FnOnce(&mut DynSession) -> R) -> PyResult<R> {
        let mut session = self
            .inner
            .lock()
            .map_err(|_| PyRuntimeError::new_err("session mutex is poisoned"))?;
        Ok(f(&mut session))
    }
}

fn seconds(value: f64) -> PyResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|err| PyValueError::new_err(format!("invalid timeout {value}: {err}")))
}

fn chord_to_dict<'py>(py: Python<'py>, chord: &Chord) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("index", chord.index)?;
    dict.set_item("actions_hex", &chord.actions_hex)?;
    dict.set_item("actions", chord.actions.clone())?;
    dict.set_item("phrase_hex", &chord.phrase_hex)?;
    dict.set_item("phrase", chord.phrase.clone())?;
    Ok(dict)
}

#[pymodule]
fn chara_serial_api(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyCharaDevice>()?;
    Ok(())
}
