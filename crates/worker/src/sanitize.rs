/// 清理文本中的控制字符
///
/// 0x00-0x08 的控制字节会导致部分向量模型和存储拒绝请求，
/// 统一替换为空格。
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .map(|ch| if ('\u{0000}'..='\u{0008}').contains(&ch) { ' ' } else { ch })
        .collect()
}
