/*
 * Test utilities and fakes for Hystfan
 *
 * Recording and scripted stand-ins for the sensor and the fan controller,
 * used by the control loop tests.
 */

#[cfg(test)]
pub mod test_utils {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use hystfan_error::{HystfanError, Result};
    use tracing::Subscriber;
    use tracing_subscriber::fmt::MakeWriter;

    use crate::logger::SinkFormat;

    use crate::hwmon::{FanActuator, FanMode, TemperatureSample, TemperatureSource};

    /// Replays a fixed list of readings; `None` is a failed read.
    /// The last entry repeats once the script runs out.
    pub struct ScriptedSensor {
        script: Mutex<VecDeque<Option<i32>>>,
        last: Mutex<Option<i32>>,
    }

    impl ScriptedSensor {
        pub fn new(readings: impl IntoIterator<Item = Option<i32>>) -> Self {
            Self {
                script: Mutex::new(readings.into_iter().collect()),
                last: Mutex::new(None),
            }
        }
    }

    impl TemperatureSource for ScriptedSensor {
        fn read(&self) -> Result<TemperatureSample> {
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                *last = next;
            }
            match *last {
                Some(c) => Ok(TemperatureSample::new(c)),
                None => Err(HystfanError::sensor("/fake/temp", "scripted failure")),
            }
        }
    }

    /// Records every successful `set_mode` call in the order the writes land
    #[derive(Default)]
    pub struct RecordingActuator {
        writes: Mutex<Vec<FanMode>>,
        failures: Mutex<usize>,
        delays: Mutex<Vec<(FanMode, Duration)>>,
    }

    impl RecordingActuator {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reject the next `n` writes
        pub fn fail_next(&self, n: usize) {
            *self.failures.lock().unwrap() = n;
        }

        /// Block every write of `mode` for `delay` before it lands
        pub fn slow_on(&self, mode: FanMode, delay: Duration) {
            self.delays.lock().unwrap().push((mode, delay));
        }

        pub fn writes(&self) -> Vec<FanMode> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl FanActuator for RecordingActuator {
        fn set_mode(&self, mode: FanMode) -> Result<()> {
            let delay = self
                .delays
                .lock()
                .unwrap()
                .iter()
                .find(|(m, _)| *m == mode)
                .map(|(_, d)| *d);
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }

            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(HystfanError::actuation("/fake/pwm1_enable", mode.code(), "injected failure"));
            }
            self.writes.lock().unwrap().push(mode);
            Ok(())
        }
    }

    /// In-memory writer for log capture
    #[derive(Clone, Default)]
    pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for SharedBuf {
        type Writer = SharedBuf;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Subscriber formatting INFO and above as log sink lines into `buf`
    pub fn sink_subscriber(buf: SharedBuf) -> impl Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .event_format(SinkFormat)
            .with_writer(buf)
            .finish()
    }
}
