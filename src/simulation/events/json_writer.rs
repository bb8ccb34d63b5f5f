use crate::simulation::events::{EventTrait, EventsManager, OnEventFnBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Mutex;
use tracing::{info, warn};

/// Writes one JSON object per event and line.
pub struct JsonEventsWriter {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonEventsWriter {
    pub fn new(path: PathBuf) -> std::io::Result<Self> {
        info!("Creating file: {path:?}");
        let file = File::create(&path)?;
        Ok(Self::from_writer(Box::new(BufWriter::new(file))))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        JsonEventsWriter {
            writer: Mutex::new(writer),
        }
    }

    pub fn on_any(&self, e: &dyn EventTrait) {
        let mut line = e.to_json().to_string();
        line.push('\n');
        self.write(&line);
    }

    fn write(&self, text: &str) {
        let mut writer = self.writer.lock().expect("Failed to lock writer");
        if let Err(e) = writer.write_all(text.as_bytes()) {
            warn!("Error while writing event: {e}");
        }
    }

    fn finish(&self) {
        info!("Finishing Events File. Calling flush on Buffered Writer.");
        let mut writer = self.writer.lock().expect("Failed to lock writer");
        if let Err(e) = writer.flush() {
            warn!("Failed to flush events: {e}");
        }
    }

    pub fn register(path: PathBuf) -> Box<OnEventFnBuilder> {
        Box::new(move |events: &mut EventsManager| match JsonEventsWriter::new(path) {
            Ok(writer) => Self::register_writer(Rc::new(writer), events),
            Err(e) => warn!("Could not create events file, events are not written: {e}"),
        })
    }

    fn register_writer(writer: Rc<JsonEventsWriter>, events: &mut EventsManager) {
        let w1 = writer.clone();
        let w2 = writer;
        events.on_any(move |e| {
            w1.on_any(e);
        });
        events.on_finish(move || {
            w2.finish();
        })
    }
}
