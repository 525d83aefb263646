//! 入库校验器
//!
//! 对一批提交记录做校验与批内去重，把每条记录归入四个结果桶之一：
//! 接受、超token上限、批内重复、缺失必填字段。校验逐条独立，
//! 去重集合为单写者（成员关系依赖批内其他记录）。

use crate::entities::RawChunk;

/// 批次分类结果
///
/// 不变式：`accepted + over_token + repeat + malformed` 的总条数
/// 等于提交条数。
#[derive(Debug, Default)]
pub struct ClassifiedBatch {
    pub accepted: Vec<RawChunk>,
    pub over_token: Vec<RawChunk>,
    pub repeat: Vec<RawChunk>,
    pub malformed: Vec<RawChunk>,
}

impl ClassifiedBatch {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.over_token.len() + self.repeat.len() + self.malformed.len()
    }
}

/// token成本估算
///
/// 确定性启发式：CJK等宽字符按1个token计，ASCII按4字符1个token计。
/// 偏保守的近似值，只用于入库时的上限裁剪，不用于计费。
pub fn estimate_tokens(text: &str) -> usize {
    let mut wide = 0usize;
    let mut narrow = 0usize;
    for ch in text.chars() {
        if ch.is_ascii() {
            narrow += 1;
        } else {
            wide += 1;
        }
    }
    wide + narrow.div_ceil(4)
}

/// 对一批记录分类
///
/// 规则按顺序判定：
/// 1. `q` 为空 -> malformed；
/// 2. `q` 的token估算超过 `token_ceiling` -> over_token；
/// 3. `q + a` 拼接在本批内已出现过 -> repeat（首次出现者被接受）；
/// 4. 其余接受。
///
/// 去重仅限本批次，跨批次的重复记录会被接受。
pub fn classify_batch(data: Vec<RawChunk>, token_ceiling: usize) -> ClassifiedBatch {
    let mut seen = std::collections::HashSet::new();
    let mut result = ClassifiedBatch::default();

    for chunk in data {
        if chunk.q.is_empty() {
            result.malformed.push(chunk);
            continue;
        }

        if estimate_tokens(&chunk.q) > token_ceiling {
            result.over_token.push(chunk);
            continue;
        }

        if seen.contains(&chunk.dedup_key()) {
            result.repeat.push(chunk);
        } else {
            seen.insert(chunk.dedup_key());
            result.accepted.push(chunk);
        }
    }

    result
}
