use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::trace_context::TracingFormat;
use super::BoxedLayer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (use 'text' or 'json')")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Local sink: one line per event in the requested format, with trace
/// correlation added by [`TracingFormat`].
pub fn console_layer<S>(writer: BoxMakeWriter, format: LogFormat) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_timer(ChronoUtc::rfc_3339());

    match format {
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .map_event_format(|inner| TracingFormat::new(inner, LogFormat::Json))
            .boxed(),
        LogFormat::Text => layer
            .compact()
            .map_event_format(|inner| TracingFormat::new(inner, LogFormat::Text))
            .boxed(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::Value;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;
    use tracing_subscriber::layer::SubscriberExt;

    /// Cloneable in-memory sink for asserting on written lines.
    #[derive(Clone, Default)]
    pub(crate) struct Buffer(pub Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        pub(crate) fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }

        pub(crate) fn json_lines(&self) -> Vec<Value> {
            self.lines()
                .iter()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }

        pub(crate) fn boxed_writer(&self) -> BoxMakeWriter {
            BoxMakeWriter::new(self.clone())
        }
    }

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn json_lines_carry_message_and_fields() {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::registry()
            .with(console_layer(buffer.boxed_writer(), LogFormat::Json));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(status = 200, path = "/mcp", cached = false, "request done");
        });

        let lines = buffer.json_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], "request done");
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[0]["status"], 200);
        assert_eq!(lines[0]["path"], "/mcp");
        assert_eq!(lines[0]["cached"], false);
        assert!(lines[0].get("timestamp").is_some());
    }

    #[test]
    fn text_lines_are_compact_key_values() {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::registry()
            .with(console_layer(buffer.boxed_writer(), LogFormat::Text));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(status = 503, "upstream unavailable");
        });

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("WARN"));
        assert!(lines[0].contains("upstream unavailable"));
        assert!(lines[0].contains("status=503"));
    }

    #[test]
    fn span_fields_reach_json_output() {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::registry()
            .with(console_layer(buffer.boxed_writer(), LogFormat::Json));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("mcp", server = "weather");
            let _entered = span.enter();
            tracing::info!("routed");
        });

        let lines = buffer.json_lines();
        assert_eq!(lines[0]["span"]["name"], "mcp");
        assert_eq!(lines[0]["span"]["server"], "weather");
    }

    #[test]
    fn format_names_parse() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("pretty".parse::<LogFormat>().is_err());
    }
}
