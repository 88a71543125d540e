//! レジスタ名

/// x86-64 の汎用レジスタ名
pub const GENERAL_REGISTERS: [&str; 17] = [
    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15", "rip",
];

/// レジスタ名を正規化する
///
/// `$RAX` や `%rax` のような表記を `rax` にそろえます。既知のレジスタでなければ None。
pub fn normalize_register_name(name: &str) -> Option<String> {
    let name = name.trim_start_matches(['$', '%']).to_ascii_lowercase();
    let name = match name.as_str() {
        "pc" => "rip".to_string(),
        "sp" => "rsp".to_string(),
        "fp" => "rbp".to_string(),
        _ => name,
    };
    GENERAL_REGISTERS.contains(&name.as_str()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_register_name() {
        assert_eq!(normalize_register_name("$RAX").as_deref(), Some("rax"));
        assert_eq!(normalize_register_name("%r12").as_deref(), Some("r12"));
        assert_eq!(normalize_register_name("pc").as_deref(), Some("rip"));
        assert_eq!(normalize_register_name("xmm0"), None);
    }
}
