//! 行组装：把纵坐标近似相同的片段拼成逻辑行

use std::collections::BTreeMap;

use crate::models::document::{Line, Token};

/// 按 `round(y / precision)` 分组，组内按 X 排序后用单个空格拼接
///
/// 行的 `y` 取最左侧片段的 y。返回结果不保证顺序，由调用方排序。
pub fn assemble_lines<'a, I>(tokens: I, precision: f64) -> Vec<Line>
where
    I: IntoIterator<Item = &'a Token>,
{
    let precision = if precision > 0.0 { precision } else { 0.1 };
    let mut groups: BTreeMap<i64, Vec<&Token>> = BTreeMap::new();

    for token in tokens {
        if token.is_blank() {
            continue;
        }
        let bucket = (token.y / precision).round() as i64;
        groups.entry(bucket).or_default().push(token);
    }

    groups
        .into_values()
        .map(|mut group| {
            group.sort_by(|a, b| a.x.total_cmp(&b.x));
            let text = group
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string();
            Line {
                y: group[0].y,
                text,
            }
        })
        .collect()
}
