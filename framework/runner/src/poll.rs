use profiler_e2e_core::prelude::{InstanceHandle, PollResult, Provisioner, Sentinels};
use std::time::Duration;
use tokio::time::Instant;

/// The interval between two reads of an instance's console output.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Wait for a sentinel to appear in the console output of an instance.
///
/// The output is read once per `interval`, the first read happens after one interval. Failed
/// and empty reads are logged and retried on the next tick, they neither move the deadline nor
/// replace the output seen so far. When both sentinels are in the same snapshot the error
/// sentinel wins.
pub async fn poll_for_sentinel(
    provisioner: &dyn Provisioner,
    handle: &InstanceHandle,
    sentinels: &Sentinels,
    timeout: Duration,
    interval: Duration,
) -> PollResult {
    let deadline = Instant::now() + timeout;
    let mut output = String::new();
    let mut tick = 0usize;

    loop {
        if tokio::time::timeout_at(deadline, tokio::time::sleep(interval))
            .await
            .is_err()
        {
            return PollResult::TimedOut { output };
        }
        tick += 1;

        let read = match tokio::time::timeout_at(deadline, provisioner.read_latest_output(handle))
            .await
        {
            Ok(read) => read,
            Err(_) => return PollResult::TimedOut { output },
        };

        match read {
            Ok(latest) if latest.is_empty() => {
                log::debug!("Poll {tick} of {handle}: ignoring empty output (will retry)");
                continue;
            }
            Ok(latest) => {
                output = latest;
                log::debug!(
                    "Poll {tick} of {handle}: read {} bytes of output",
                    output.len()
                );
            }
            Err(e) => {
                log::warn!("Transient error reading output of {handle} (will retry): {e}");
                continue;
            }
        }

        if let Some(error) = &sentinels.error {
            if output.contains(error.as_str()) {
                return PollResult::Failed {
                    output,
                    sentinel: error.clone(),
                };
            }
        }

        if output.contains(sentinels.finish.as_str()) {
            return PollResult::Completed { output };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use profiler_e2e_core::prelude::{FetchError, InstanceSpec, ProvisioningError};
    use std::collections::VecDeque;

    /// Hands out one scripted read per call and repeats the last one once exhausted.
    struct ScriptedOutput {
        reads: Mutex<VecDeque<Result<String, String>>>,
        last: Mutex<Option<Result<String, String>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedOutput {
        fn new(reads: Vec<Result<&str, &str>>) -> Self {
            Self {
                reads: Mutex::new(
                    reads
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                last: Mutex::new(None),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait::async_trait]
    impl Provisioner for ScriptedOutput {
        async fn create(&self, spec: &InstanceSpec) -> Result<InstanceHandle, ProvisioningError> {
            Ok(spec.handle())
        }

        async fn delete(&self, _handle: &InstanceHandle) -> Result<(), ProvisioningError> {
            Ok(())
        }

        async fn read_latest_output(&self, handle: &InstanceHandle) -> Result<String, FetchError> {
            *self.calls.lock() += 1;
            let next = self.reads.lock().pop_front();
            let read = match next {
                Some(read) => {
                    *self.last.lock() = Some(read.clone());
                    read
                }
                None => self.last.lock().clone().unwrap_or(Ok(String::new())),
            };
            read.map_err(|message| FetchError {
                instance: handle.name.clone(),
                message,
            })
        }
    }

    fn handle() -> InstanceHandle {
        InstanceHandle {
            project: "proj".to_string(),
            zone: "us-east1-b".to_string(),
            name: "svc-A".to_string(),
        }
    }

    fn sentinels() -> Sentinels {
        Sentinels {
            finish: "DONE".to_string(),
            error: Some("FAILED".to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn complete_on_third_tick() {
        let provisioner = ScriptedOutput::new(vec![
            Ok("booting..."),
            Ok("installing..."),
            Ok("DONE"),
            Ok("never read"),
        ]);

        let result = poll_for_sentinel(
            &provisioner,
            &handle(),
            &sentinels(),
            Duration::from_secs(600),
            DEFAULT_POLL_INTERVAL,
        )
        .await;

        assert_eq!(
            PollResult::Completed {
                output: "DONE".to_string()
            },
            result
        );
        // No reads after the sentinel was seen.
        assert_eq!(3, provisioner.calls());
    }

    #[tokio::test(start_paused = true)]
    async fn time_out_without_sentinel() {
        let provisioner = ScriptedOutput::new(vec![Ok("booting..."), Ok("installing...")]);

        let result = poll_for_sentinel(
            &provisioner,
            &handle(),
            &sentinels(),
            Duration::from_secs(90),
            DEFAULT_POLL_INTERVAL,
        )
        .await;

        assert_eq!(
            PollResult::TimedOut {
                output: "installing...".to_string()
            },
            result
        );
        assert_eq!(4, provisioner.calls());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let provisioner = ScriptedOutput::new(vec![
            Ok("booting..."),
            Err("connection reset"),
            Err("503"),
            Ok("booting...\nDONE"),
        ]);

        let result = poll_for_sentinel(
            &provisioner,
            &handle(),
            &sentinels(),
            Duration::from_secs(600),
            DEFAULT_POLL_INTERVAL,
        )
        .await;

        assert!(result.is_completed(), "{result:?}");
        assert_eq!(4, provisioner.calls());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_keep_last_output_on_timeout() {
        let provisioner = ScriptedOutput::new(vec![Ok("booting..."), Err("connection reset")]);

        let result = poll_for_sentinel(
            &provisioner,
            &handle(),
            &sentinels(),
            Duration::from_secs(70),
            DEFAULT_POLL_INTERVAL,
        )
        .await;

        assert_eq!(
            PollResult::TimedOut {
                output: "booting...".to_string()
            },
            result
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_reads_keep_last_output_on_timeout() {
        let provisioner = ScriptedOutput::new(vec![Ok("installing node 14..."), Ok("")]);

        let result = poll_for_sentinel(
            &provisioner,
            &handle(),
            &sentinels(),
            Duration::from_secs(70),
            DEFAULT_POLL_INTERVAL,
        )
        .await;

        assert_eq!(
            PollResult::TimedOut {
                output: "installing node 14...".to_string()
            },
            result
        );
        assert_eq!(3, provisioner.calls());
    }

    #[tokio::test(start_paused = true)]
    async fn complete_after_empty_read() {
        let provisioner = ScriptedOutput::new(vec![Ok("booting..."), Ok(""), Ok("booting...\nDONE")]);

        let result = poll_for_sentinel(
            &provisioner,
            &handle(),
            &sentinels(),
            Duration::from_secs(600),
            DEFAULT_POLL_INTERVAL,
        )
        .await;

        assert_eq!(
            PollResult::Completed {
                output: "booting...\nDONE".to_string()
            },
            result
        );
    }

    #[tokio::test(start_paused = true)]
    async fn error_sentinel_fails() {
        let provisioner = ScriptedOutput::new(vec![Ok("npm ERR!\nFAILED")]);

        let result = poll_for_sentinel(
            &provisioner,
            &handle(),
            &sentinels(),
            Duration::from_secs(600),
            DEFAULT_POLL_INTERVAL,
        )
        .await;

        assert_eq!(
            PollResult::Failed {
                output: "npm ERR!\nFAILED".to_string(),
                sentinel: "FAILED".to_string()
            },
            result
        );
    }

    #[tokio::test(start_paused = true)]
    async fn error_sentinel_wins_over_finish_sentinel() {
        for _ in 0..5 {
            let provisioner = ScriptedOutput::new(vec![Ok("DONE\nFAILED")]);

            let result = poll_for_sentinel(
                &provisioner,
                &handle(),
                &sentinels(),
                Duration::from_secs(600),
                DEFAULT_POLL_INTERVAL,
            )
            .await;

            assert!(matches!(result, PollResult::Failed { .. }), "{result:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_error_sentinel_configured() {
        let provisioner = ScriptedOutput::new(vec![Ok("FAILED\nDONE")]);
        let sentinels = Sentinels {
            finish: "DONE".to_string(),
            error: None,
        };

        let result = poll_for_sentinel(
            &provisioner,
            &handle(),
            &sentinels,
            Duration::from_secs(600),
            DEFAULT_POLL_INTERVAL,
        )
        .await;

        assert!(result.is_completed(), "{result:?}");
    }
}
