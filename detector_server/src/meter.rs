use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

/// Counters of captured frames and classified ticks.
pub struct Meter {
    captured_frames: AtomicU64,
    classified_frames: AtomicU64,
    failed_ticks: AtomicU64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            captured_frames: AtomicU64::new(0),
            classified_frames: AtomicU64::new(0),
            failed_ticks: AtomicU64::new(0),
        }
    }

    pub fn tick_captured(&self) {
        self.captured_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_classified(&self) {
        self.classified_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_failed(&self) {
        self.failed_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_reset_captured(&self) -> u64 {
        self.captured_frames.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_classified(&self) -> u64 {
        self.classified_frames.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_failed(&self) -> u64 {
        self.failed_ticks.swap(0, Ordering::Relaxed)
    }
}

pub fn spawn_meter_logger() -> JoinHandle<()> {
    tokio::spawn(async {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let captured_frames = METER.get_reset_captured();
            let classified_frames = METER.get_reset_classified();
            let failed_ticks = METER.get_reset_failed();
            let elapsed = start.elapsed().as_secs_f32();
            let fps_captured = captured_frames as f32 / elapsed;
            let fps_classified = classified_frames as f32 / elapsed;

            if captured_frames > 0 {
                log::info!("Captured frames per second: {fps_captured:.2}")
            }
            if classified_frames > 0 {
                log::info!("Classified frames per second: {fps_classified:.2}")
            }
            if failed_ticks > 0 {
                log::warn!("Failed detection ticks: {failed_ticks}")
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::Meter;

    #[test]
    fn test_counters_reset_on_read() {
        let meter = Meter::new();
        meter.tick_captured();
        meter.tick_captured();
        meter.tick_classified();

        assert_eq!(meter.get_reset_captured(), 2);
        assert_eq!(meter.get_reset_captured(), 0);
        assert_eq!(meter.get_reset_classified(), 1);
        assert_eq!(meter.get_reset_failed(), 0);
    }
}
