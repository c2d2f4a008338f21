use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 进度回调：(当前路径, 总传输字节数, 总速率 字节/秒)
pub type ProgressCallback = Box<dyn FnMut(&str, u64, f64) + Send>;

/// 回调节流间隔
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotProgress {
    pub current_path: String,
    pub transferred: u64, // 当前任务已传输
    pub rate: f64,        // 当前任务速率
    pub completed: u64,   // 已完成任务累计
}

/// 单个工作线程的分配状态
#[derive(Debug, Clone)]
pub struct Slot {
    pub ready: bool,
    pub progress: SlotProgress,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            ready: true,
            progress: SlotProgress::default(),
        }
    }
}

impl Slot {
    pub fn assign(&mut self, path: String) {
        self.ready = false;
        self.progress.current_path = path;
        self.progress.transferred = 0;
        self.progress.rate = 0.0;
    }

    pub fn update(&mut self, path: String, transferred: u64, rate: f64) {
        self.progress.current_path = path;
        self.progress.transferred = transferred;
        self.progress.rate = rate;
    }

    /// 当前任务完成：进行中的字节并入累计值并清零
    pub fn finish(&mut self) {
        self.progress.completed += self.progress.transferred;
        self.progress.transferred = 0;
        self.progress.rate = 0.0;
        self.ready = true;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateProgress {
    pub transferred: u64,
    pub rate: f64,
    pub active_workers: usize,
}

impl AggregateProgress {
    pub fn of(slots: &[Slot]) -> Self {
        slots.iter().fold(Self::default(), |mut total, slot| {
            let p = &slot.progress;
            total.transferred += p.completed + p.transferred;
            if p.rate > 0.0 {
                total.rate += p.rate;
                total.active_workers += 1;
            }
            total
        })
    }
}

/// 限制回调频率
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// 距离上次触发已超过间隔时返回 true 并记录本次触发
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn mark(&mut self) {
        self.last = Some(Instant::now());
    }
}

/// 滑动窗口速率计算
#[derive(Debug)]
pub struct RateMeter {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl RateMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
        }
    }

    /// 记录累计字节数，返回窗口内的平均速率
    pub fn record(&mut self, total_bytes: u64) -> f64 {
        self.record_at(Instant::now(), total_bytes)
    }

    fn record_at(&mut self, now: Instant, total_bytes: u64) -> f64 {
        self.samples.push_back((now, total_bytes));
        while let Some(&(at, _)) = self.samples.front() {
            if now.duration_since(at) > self.window && self.samples.len() > 2 {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        let (Some(&(first_at, first)), Some(&(last_at, last))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let elapsed = last_at.duration_since(first_at).as_secs_f64();
        if elapsed <= 0.0 || last < first {
            return 0.0;
        }
        (last - first) as f64 / elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(completed: u64, transferred: u64, rate: f64) -> Slot {
        Slot {
            ready: transferred == 0,
            progress: SlotProgress {
                current_path: String::new(),
                transferred,
                rate,
                completed,
            },
        }
    }

    #[test]
    fn aggregate_sums_completed_and_in_flight() {
        let slots = vec![slot(100, 20, 5.0), slot(0, 0, 0.0), slot(30, 10, 2.5)];
        let total = AggregateProgress::of(&slots);
        assert_eq!(total.transferred, 160);
        assert_eq!(total.rate, 7.5);
        assert_eq!(total.active_workers, 2);
    }

    #[test]
    fn finish_folds_in_flight_bytes_once() {
        let mut s = Slot::default();
        s.assign("/a".to_string());
        s.update("/a".to_string(), 42, 10.0);
        s.finish();
        assert!(s.ready);
        assert_eq!(s.progress.completed, 42);
        assert_eq!(s.progress.transferred, 0);
        assert_eq!(s.progress.rate, 0.0);

        s.assign("/b".to_string());
        assert_eq!(AggregateProgress::of(&[s]).transferred, 42);
    }

    #[test]
    fn throttle_blocks_within_interval() {
        let mut throttle = Throttle::new(Duration::from_secs(60));
        assert!(throttle.ready());
        assert!(!throttle.ready());
    }

    #[test]
    fn rate_meter_averages_over_window() {
        let mut meter = RateMeter::new(Duration::from_secs(10));
        let start = Instant::now();
        assert_eq!(meter.record_at(start, 0), 0.0);
        let rate = meter.record_at(start + Duration::from_secs(2), 1000);
        assert!((rate - 500.0).abs() < f64::EPSILON);
    }
}
