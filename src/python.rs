// Python bindings
//
//   from nowplaying import Listener
//   Listener(port=8000, outfile="np.txt", custom_callback=print).start()

use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use pyo3::exceptions::{PyOSError, PyRuntimeError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::dispatch::TrackEvent;
use crate::error::SubscriberError;
use crate::server::{ServerConfig, SourceServer, DEFAULT_PORT};
use crate::sinks::{CallbackSink, SinkOptions};

#[pymodule]
fn nowplaying(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Listener>()?;
    Ok(())
}

/// Listens for a source stream and reports each track
#[pyclass]
pub struct Listener {
    #[pyo3(get, set)]
    port: u16,
    #[pyo3(get, set)]
    quiet: bool,
    #[pyo3(get, set)]
    outfile: Option<String>,
    custom_callback: Option<Py<PyAny>>,
}

#[pymethods]
impl Listener {
    #[new]
    #[pyo3(signature = (port=DEFAULT_PORT, quiet=false, outfile=None, custom_callback=None))]
    fn new(port: u16, quiet: bool, outfile: Option<String>, custom_callback: Option<Py<PyAny>>) -> Self {
        Listener { port, quiet, outfile, custom_callback }
    }

    /// Serve until interrupted with Ctrl+C
    fn start(&self, py: Python<'_>) -> PyResult<()> {
        let options = SinkOptions {
            console: !self.quiet,
            outfile: self.outfile.as_ref().map(PathBuf::from),
            ..SinkOptions::default()
        };
        let mut dispatcher = options.build().map_err(|e| PyOSError::new_err(e.to_string()))?;
        if let Some(callback) = &self.custom_callback {
            dispatcher.subscribe_boxed(Box::new(python_sink(callback.clone_ref(py))));
        }

        let config = ServerConfig { port: self.port, ..ServerConfig::default() };
        let dispatcher = Arc::new(dispatcher);
        py.detach(move || serve(config, dispatcher)).map_err(PyRuntimeError::new_err)
    }

    fn __repr__(&self) -> String {
        format!("Listener(port={}, quiet={}, outfile={:?})", self.port, self.quiet, self.outfile)
    }
}

/// Calls `callback` with a dict of the comment fields, keys lowercased
fn python_sink(callback: Py<PyAny>) -> CallbackSink {
    CallbackSink::new("python", move |event: &TrackEvent| {
        Python::attach(|py| -> PyResult<()> {
            let fields = PyDict::new(py);
            for (key, value) in &event.fields {
                fields.set_item(key.to_lowercase(), value)?;
            }
            callback.call1(py, (fields,))?;
            Ok(())
        })
        .map_err(|e| SubscriberError::Callback(e.to_string()))
    })
}

fn serve(config: ServerConfig, dispatcher: Arc<crate::MetadataDispatcher>) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| e.to_string())?;

    runtime.block_on(async move {
        let server = SourceServer::bind(config, dispatcher).await.map_err(|e| e.to_string())?;
        if let Ok(addr) = server.local_addr() {
            info!("listening on {}", addr);
        }
        server
            .run(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
            .map_err(|e| e.to_string())
    })
}
