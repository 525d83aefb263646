use std::sync::atomic::{AtomicUsize, Ordering};

/// 并发治理器
///
/// 进程级在途任务计数，上限为配置的 `vector_max_process`。
/// 仅约束本进程，不做跨进程协调；全局并发由部署的进程数决定。
#[derive(Debug)]
pub struct ConcurrencyGovernor {
    max: usize,
    in_flight: AtomicUsize,
}

impl ConcurrencyGovernor {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// 申请一个并发槽；已达上限时拒绝
    pub fn try_admit(&self) -> bool {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current >= self.max {
                    None
                } else {
                    Some(current + 1)
                }
            })
            .is_ok()
    }

    /// 释放一个并发槽；计数下限为0，重复释放不会变成负数
    pub fn release(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}
