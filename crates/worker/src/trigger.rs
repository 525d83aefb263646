use std::sync::Arc;

use trainer_domain::QueueWaker;

use crate::generator::VectorGenerator;

/// 队列触发器
///
/// 每次唤醒按并发上限起满生成链；多余的链会在申请不到
/// 并发槽时立即退出，所以重复唤醒是安全的。
pub struct QueueTrigger {
    generator: Arc<VectorGenerator>,
}

impl QueueTrigger {
    pub fn new(generator: Arc<VectorGenerator>) -> Self {
        Self { generator }
    }
}

impl QueueWaker for QueueTrigger {
    fn wake(&self) {
        for _ in 0..self.generator.governor().max() {
            let generator = Arc::clone(&self.generator);
            tokio::spawn(async move {
                generator.run_chain().await;
            });
        }
    }

    fn in_flight(&self) -> usize {
        self.generator.governor().in_flight()
    }
}
