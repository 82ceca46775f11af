use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::core::CheckResult;

#[derive(Debug)]
pub enum CycleStatus {
    Completed(Vec<CheckResult>),
    SessionExpired,
    Skipped,
}

pub trait CycleRunner: Send + Sync + 'static {
    fn run_cycle(&self) -> CycleStatus;
}

enum Command {
    RunNow,
    Stop,
}

/// サイクルは常にワーカースレッド 1 本で直列に実行される。
pub struct Scheduler {
    worker: Option<(Sender<Command>, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { worker: None }
    }

    /// 稼働中のワーカーがあれば停止してから、即時に 1 サイクル実行し、
    /// 以後 interval ごとに実行するワーカーを起動する。
    pub fn start(
        &mut self,
        runner: Arc<dyn CycleRunner>,
        interval: Duration,
        on_complete: Arc<dyn Fn(&[CheckResult], bool) + Send + Sync>,
        on_session_expired: Arc<dyn Fn() + Send + Sync>,
    ) -> Result<()> {
        self.stop();

        let (tx, rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("complyd-scheduler".to_string())
            .spawn(move || loop {
                match runner.run_cycle() {
                    CycleStatus::Completed(results) => {
                        let is_compliant = results.iter().all(|r| r.passed);
                        on_complete(&results, is_compliant);
                    }
                    CycleStatus::SessionExpired => {
                        on_session_expired();
                        break;
                    }
                    CycleStatus::Skipped => {}
                }
                // サイクル中に届いたトリガは破棄する（キューに積まない）
                loop {
                    match rx.try_recv() {
                        Ok(Command::RunNow) => continue,
                        Ok(Command::Stop) | Err(TryRecvError::Disconnected) => return,
                        Err(TryRecvError::Empty) => break,
                    }
                }
                match rx.recv_timeout(interval) {
                    Ok(Command::RunNow) | Err(RecvTimeoutError::Timeout) => continue,
                    Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .context("スケジューラスレッドの起動に失敗しました")?;

        self.worker = Some((tx, handle));
        Ok(())
    }

    /// サイクル実行中に届いたトリガはワーカー側で破棄される（多重実行しない）。
    pub fn run_now(&self) {
        if let Some((tx, _)) = &self.worker {
            let _ = tx.send(Command::RunNow);
        }
    }

    pub fn stop(&mut self) {
        if let Some((tx, handle)) = self.worker.take() {
            let _ = tx.send(Command::Stop);
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CheckType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowRunner {
        cycles: AtomicUsize,
        delay: Duration,
    }

    impl CycleRunner for SlowRunner {
        fn run_cycle(&self) -> CycleStatus {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            CycleStatus::Completed(Vec::new())
        }
    }

    struct ExpiringRunner;

    impl CycleRunner for ExpiringRunner {
        fn run_cycle(&self) -> CycleStatus {
            CycleStatus::SessionExpired
        }
    }

    struct SkippingRunner;

    impl CycleRunner for SkippingRunner {
        fn run_cycle(&self) -> CycleStatus {
            CycleStatus::Skipped
        }
    }

    struct FailingCheckRunner;

    impl CycleRunner for FailingCheckRunner {
        fn run_cycle(&self) -> CycleStatus {
            CycleStatus::Completed(vec![
                CheckResult::passed(CheckType::ScreenLock, "test", "", "ok"),
                CheckResult::failed(CheckType::DiskEncryption, "test", "", "ng"),
            ])
        }
    }

    #[test]
    fn run_now_during_a_cycle_does_not_stack_cycles() {
        let runner = Arc::new(SlowRunner {
            cycles: AtomicUsize::new(0),
            delay: Duration::from_millis(200),
        });
        let completions = Arc::new(AtomicUsize::new(0));
        let completions_cb = Arc::clone(&completions);

        let mut scheduler = Scheduler::new();
        scheduler
            .start(
                Arc::clone(&runner) as Arc<dyn CycleRunner>,
                Duration::from_secs(3600),
                Arc::new(move |_results, _is_compliant| {
                    completions_cb.fetch_add(1, Ordering::SeqCst);
                }),
                Arc::new(|| {}),
            )
            .unwrap();

        // 初回サイクルの実行中にトリガを積む。キューに残っていても
        // サイクル後にまとめて破棄される
        std::thread::sleep(Duration::from_millis(50));
        scheduler.run_now();
        scheduler.run_now();
        std::thread::sleep(Duration::from_millis(400));
        scheduler.stop();

        assert_eq!(runner.cycles.load(Ordering::SeqCst), 1);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_now_between_cycles_triggers_one_more() {
        let runner = Arc::new(SlowRunner {
            cycles: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });

        let mut scheduler = Scheduler::new();
        scheduler
            .start(
                Arc::clone(&runner) as Arc<dyn CycleRunner>,
                Duration::from_secs(3600),
                Arc::new(|_results, _is_compliant| {}),
                Arc::new(|| {}),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(runner.cycles.load(Ordering::SeqCst), 1);

        scheduler.run_now();
        std::thread::sleep(Duration::from_millis(100));
        scheduler.stop();

        assert_eq!(runner.cycles.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn completion_carries_the_aggregate_compliance() {
        // 0 = 未通知, 1 = 準拠, 2 = 非準拠
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);

        let mut scheduler = Scheduler::new();
        scheduler
            .start(
                Arc::new(FailingCheckRunner),
                Duration::from_secs(3600),
                Arc::new(move |results, is_compliant| {
                    assert_eq!(results.len(), 2);
                    seen_cb.store(if is_compliant { 1 } else { 2 }, Ordering::SeqCst);
                }),
                Arc::new(|| {}),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        scheduler.stop();

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn session_expiry_stops_polling_and_notifies_once() {
        let expired = Arc::new(AtomicUsize::new(0));
        let expired_cb = Arc::clone(&expired);
        let completions = Arc::new(AtomicUsize::new(0));
        let completions_cb = Arc::clone(&completions);

        let mut scheduler = Scheduler::new();
        scheduler
            .start(
                Arc::new(ExpiringRunner),
                Duration::from_millis(10),
                Arc::new(move |_results, _is_compliant| {
                    completions_cb.fetch_add(1, Ordering::SeqCst);
                }),
                Arc::new(move || {
                    expired_cb.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(200));
        scheduler.stop();

        assert_eq!(expired.load(Ordering::SeqCst), 1);
        assert_eq!(completions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn skipped_cycle_does_not_fire_completion() {
        let completions = Arc::new(AtomicUsize::new(0));
        let completions_cb = Arc::clone(&completions);

        let mut scheduler = Scheduler::new();
        scheduler
            .start(
                Arc::new(SkippingRunner),
                Duration::from_secs(3600),
                Arc::new(move |_results, _is_compliant| {
                    completions_cb.fetch_add(1, Ordering::SeqCst);
                }),
                Arc::new(|| {}),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        scheduler.stop();

        assert_eq!(completions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut scheduler = Scheduler::new();
        scheduler
            .start(
                Arc::new(SkippingRunner),
                Duration::from_secs(3600),
                Arc::new(|_results, _is_compliant| {}),
                Arc::new(|| {}),
            )
            .unwrap();

        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }
}
