//! デバッガコマンド

use crate::format::DisplayFormat;

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 式を評価して表示
    Print { format: DisplayFormat, expr: String },
    /// 変数・フィールド・レジスタへ代入
    Set { lvalue: String, value: String },
    /// 型の宣言を表示
    Ptype(String),
    /// ターゲット内のメソッドを呼び出す（中断可能）
    Call(String),
    /// 停止のたびに自動表示する式を登録（式がなければ一覧を表示）
    Display { format: DisplayFormat, expr: Option<String> },
    /// 自動表示を削除
    Undisplay(usize),
    /// 自動表示の一覧
    InfoDisplay,
    /// 現在のフレームを表示
    Frame,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

/// `print/x` のようなコマンド名と書式指定を分ける
fn split_format(word: &str) -> Option<(&str, DisplayFormat)> {
    match word.split_once('/') {
        Some((name, letters)) => {
            let mut chars = letters.chars();
            let format = DisplayFormat::from_letter(chars.next()?)?;
            if chars.next().is_some() {
                return None;
            }
            Some((name, format))
        }
        None => Some((word, DisplayFormat::Default)),
    }
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let (word, rest) = match input.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (input, ""),
        };
        if word.is_empty() {
            return None;
        }
        let (name, format) = split_format(word)?;
        let arg = (!rest.is_empty()).then(|| rest.to_string());

        match name {
            "print" | "p" | "inspect" => Some(Command::Print { format, expr: arg? }),
            "set" => {
                let rest = rest.strip_prefix("var ").map(str::trim).unwrap_or(rest);
                let (lvalue, value) = rest.split_once('=')?;
                let (lvalue, value) = (lvalue.trim(), value.trim());
                if lvalue.is_empty() || value.is_empty() {
                    return None;
                }
                Some(Command::Set {
                    lvalue: lvalue.to_string(),
                    value: value.to_string(),
                })
            }
            "ptype" | "whatis" => Some(Command::Ptype(arg?)),
            "call" => Some(Command::Call(arg?)),
            "display" => Some(Command::Display { format, expr: arg }),
            "undisplay" => rest.parse().ok().map(Command::Undisplay),
            "info" => match rest {
                "display" => Some(Command::InfoDisplay),
                _ => None,
            },
            "frame" | "f" => Some(Command::Frame),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse("print foo.Data"),
            Some(Command::Print {
                format: DisplayFormat::Default,
                expr: "foo.Data".to_string()
            })
        );
        assert_eq!(
            Command::parse("p/x pub"),
            Some(Command::Print {
                format: DisplayFormat::HexaDecimal,
                expr: "pub".to_string()
            })
        );
        assert_eq!(Command::parse("call Tester.Hang()"), Some(Command::Call("Tester.Hang()".to_string())));
        assert_eq!(Command::parse("undisplay 2"), Some(Command::Undisplay(2)));
        assert_eq!(Command::parse("info display"), Some(Command::InfoDisplay));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
    }

    #[test]
    fn test_parse_set() {
        assert_eq!(
            Command::parse("set var foo.Data = 7"),
            Some(Command::Set {
                lvalue: "foo.Data".to_string(),
                value: "7".to_string()
            })
        );
        assert_eq!(Command::parse("set foo.Data"), None);
    }

    #[test]
    fn test_parse_format_suffixes() {
        assert_eq!(
            Command::parse("display/o origin"),
            Some(Command::Display {
                format: DisplayFormat::Object,
                expr: Some("origin".to_string())
            })
        );
        assert_eq!(
            Command::parse("display"),
            Some(Command::Display {
                format: DisplayFormat::Default,
                expr: None
            })
        );
        assert!(matches!(
            Command::parse("print/a foo"),
            Some(Command::Print { format: DisplayFormat::Address, .. })
        ));
        assert_eq!(Command::parse("print/z foo"), None);
        assert_eq!(Command::parse("print"), None);
        assert_eq!(Command::parse(""), None);
    }
}
