#![allow(dead_code)]

pub mod temp_files {
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Write `content` to a temporary file with extension `ext`; removed on drop
    pub fn create_temp_config(content: &str, ext: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("brrtgate_test_")
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    pub fn create_temp_yaml(content: &str) -> NamedTempFile {
        create_temp_config(content, "yaml")
    }

    pub fn create_temp_json(content: &str) -> NamedTempFile {
        create_temp_config(content, "json")
    }
}

pub mod test_runtime {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_workers(4).set_stack_size(0x8000);
        });
    }
}

pub mod backends {
    use brrtgate::backend::BackendTransmitter;
    use brrtgate::message::{InboundMessage, OutboundMessage, Payload};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// How a [`ScriptedBackend`] answers synchronous calls
    #[derive(Debug, Clone, Copy)]
    pub enum Script {
        /// Reply at once with the request's correlation id echoed in the payload
        Echo,
        /// Wait out the deadline and give no result
        Silent,
        /// Give no result at once
        Unreachable,
        /// Block until [`ScriptedBackend::open`] is called (or the deadline passes)
        Gated,
    }

    /// Backend transmitter that counts every call and follows a fixed [`Script`]
    pub struct ScriptedBackend {
        script: Script,
        gate_open: AtomicBool,
        calls: AtomicUsize,
        sends: AtomicUsize,
        sent_ids: Mutex<Vec<i64>>,
    }

    impl ScriptedBackend {
        pub fn new(script: Script) -> Self {
            Self {
                script,
                gate_open: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                sends: AtomicUsize::new(0),
                sent_ids: Mutex::new(Vec::new()),
            }
        }

        pub fn open(&self) {
            self.gate_open.store(true, Ordering::SeqCst);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn sends(&self) -> usize {
            self.sends.load(Ordering::SeqCst)
        }

        pub fn sent_ids(&self) -> Vec<i64> {
            let mut ids = self.sent_ids.lock().clone();
            ids.sort_unstable();
            ids
        }

        fn echo(message: &InboundMessage) -> OutboundMessage {
            let mut payload = Payload::new();
            payload.insert("echo".to_string(), json!(message.correlation_id()));
            payload.insert("input".to_string(), json!(message.payload()));
            OutboundMessage::ok(message.action_name(), message.correlation_id(), payload)
        }
    }

    impl BackendTransmitter for ScriptedBackend {
        fn call_and_wait(
            &self,
            _channel: &str,
            message: &InboundMessage,
            deadline: Duration,
        ) -> Option<OutboundMessage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Echo => Some(Self::echo(message)),
                Script::Unreachable => None,
                Script::Silent => {
                    may::coroutine::sleep(deadline);
                    None
                }
                Script::Gated => {
                    let start = Instant::now();
                    while !self.gate_open.load(Ordering::SeqCst) {
                        if start.elapsed() >= deadline {
                            return None;
                        }
                        may::coroutine::sleep(Duration::from_millis(1));
                    }
                    Some(Self::echo(message))
                }
            }
        }

        fn send_only(&self, _channel: &str, message: &InboundMessage) {
            self.sends.fetch_add(1, Ordering::SeqCst);
            self.sent_ids.lock().push(message.correlation_id());
        }
    }
}

pub mod gateways {
    use brrtgate::backend::BackendTransmitter;
    use brrtgate::gateway::{ChannelConfig, ChannelGateway};
    use brrtgate::recorder::ResponseTimeRecorder;
    use brrtgate::worker_pool::WorkerPoolConfig;
    use std::sync::Arc;
    use std::time::Duration;

    /// Gateway for channel "Messaging" with "Typing" as its fire-and-forget action
    pub fn messaging_gateway(
        backend: Arc<dyn BackendTransmitter>,
        workers: WorkerPoolConfig,
        deadline: Duration,
        max_idle_tasks: usize,
    ) -> ChannelGateway {
        ChannelGateway::new(
            ChannelConfig::new("Messaging")
                .with_fire_and_forget(["Typing"])
                .with_call_deadline(deadline)
                .with_workers(workers)
                .with_max_idle_tasks(max_idle_tasks),
            backend,
            Arc::new(ResponseTimeRecorder::new()),
        )
    }
}
