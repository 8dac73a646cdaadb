use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

pub type TickFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type TickCallback = Arc<dyn Fn() -> TickFuture + Send + Sync>;

/// Periodic trigger. Implementations invoke every registered callback once per tick.
pub trait Ticker {
    fn on_tick(&self, callback: TickCallback);
}

#[derive(Clone)]
pub struct IntervalTicker {
    period: Duration,
    callbacks: Arc<RwLock<Vec<TickCallback>>>,
    shutdown: Arc<Notify>,
    ticks: Arc<AtomicU64>,
}

impl Ticker for IntervalTicker {
    fn on_tick(&self, callback: TickCallback) {
        match self.callbacks.write() {
            Ok(mut callbacks) => callbacks.push(callback),
            Err(_) => tracing::error!("ticker callback lock poisoned; callback dropped"),
        }
    }
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            callbacks: Arc::new(RwLock::new(Vec::new())),
            shutdown: Arc::new(Notify::new()),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn start(&self) -> JoinHandle<()> {
        let ticker = self.clone();
        tokio::spawn(async move {
            ticker.run_loop().await;
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn run_loop(self) {
        let mut interval = tokio::time::interval(self.period);
        // A slow tick must not cause a burst of catch-up ticks.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(period_ms = self.period.as_millis() as u64, "ticker started");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = interval.tick() => self.fire().await,
            }
        }
        tracing::info!(ticks = self.tick_count(), "ticker stopped");
    }

    async fn fire(&self) {
        let callbacks = match self.callbacks.read() {
            Ok(callbacks) => callbacks.clone(),
            Err(_) => {
                tracing::error!("ticker callback lock poisoned; skipping tick");
                return;
            }
        };
        for callback in callbacks {
            callback().await;
        }
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

/// Wraps synchronous work (file I/O, child processes) so it runs on the
/// blocking pool instead of a runtime worker.
pub fn blocking_callback<F>(job: F) -> TickCallback
where
    F: Fn() + Send + Sync + 'static,
{
    let job = Arc::new(job);
    Arc::new(move || {
        let job = job.clone();
        Box::pin(async move {
            if let Err(error) = tokio::task::spawn_blocking(move || job()).await {
                tracing::error!(error = %error, "tick job panicked");
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::{blocking_callback, IntervalTicker, Ticker};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::{timeout, Duration};

    async fn wait_for(counter: &AtomicUsize, at_least: usize) {
        timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::SeqCst) < at_least {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("ticks arrive before timeout");
    }

    #[tokio::test]
    async fn runs_registered_callbacks_each_tick() {
        let ticker = IntervalTicker::new(Duration::from_millis(10));
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        for counter in [first.clone(), second.clone()] {
            ticker.on_tick(Arc::new(move || {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            }));
        }

        let handle = ticker.start();
        wait_for(&first, 3).await;
        wait_for(&second, 3).await;
        ticker.shutdown();
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("ticker stops")
            .expect("ticker task joins");
        assert!(ticker.tick_count() >= 3);
    }

    #[tokio::test]
    async fn blocking_callbacks_run_off_the_runtime() {
        let ticker = IntervalTicker::new(Duration::from_millis(10));
        let calls = Arc::new(AtomicUsize::new(0));
        let job_calls = calls.clone();
        ticker.on_tick(blocking_callback(move || {
            std::thread::sleep(std::time::Duration::from_millis(1));
            job_calls.fetch_add(1, Ordering::SeqCst);
        }));

        let handle = ticker.start();
        wait_for(&calls, 2).await;
        ticker.shutdown();
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("ticker stops")
            .expect("ticker task joins");
    }

    #[tokio::test]
    async fn shutdown_before_start_stops_immediately() {
        let ticker = IntervalTicker::new(Duration::from_secs(3600));
        ticker.shutdown();
        let handle = ticker.start();
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("ticker stops")
            .expect("ticker task joins");
    }
}
