//! 特殊字段规则引擎 - 业务能力层
//!
//! 只负责"一个字段在新旧两页上是否满足策略"，不关心页面对齐和逐行比对。

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::models::document::{FieldMatch, Token};
use crate::models::field::{FieldPolicy, PredicateId, SpecialFieldDefinition};
use crate::models::outcome::{FieldVerdict, VerdictResult, NOT_AVAILABLE};

static DAY_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+dagen").expect("valid day-count regex"));

/// 金额归一化：去掉货币符号、千分位/小数分隔符和空白
pub fn normalize_amount(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '€' | '$' | '£' | ',' | '.') && !c.is_whitespace())
        .collect()
}

/// 整行归一化：连续空白折叠为一个空格
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn joined(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn verdict(
    def: &SpecialFieldDefinition,
    page_number: usize,
    old_value: Option<String>,
    new_value: Option<String>,
    pass: bool,
) -> FieldVerdict {
    FieldVerdict {
        key: format!("{} (Page {})", def.label, page_number),
        old_value: old_value
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        new_value: new_value
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        result: if pass {
            VerdictResult::Pass
        } else {
            VerdictResult::Fail
        },
        group: def.group.clone(),
        y: None,
    }
}

/// 评估单个字段
///
/// 仅在新旧两页都定位到该字段时调用。返回 `None` 表示指定位置取不到有效值，
/// 此时视同字段缺失，不产生结论。
pub fn evaluate_field(
    def: &SpecialFieldDefinition,
    old: &FieldMatch,
    new: &FieldMatch,
    page_number: usize,
) -> Option<FieldVerdict> {
    match &def.policy {
        FieldPolicy::MustDiffer { index } | FieldPolicy::MustMatchAt { index } => {
            let old_raw = old.tokens.get(*index).map(|t| t.text.clone());
            let new_raw = new.tokens.get(*index).map(|t| t.text.clone());
            let old_norm = old_raw.as_deref().map(normalize_amount).unwrap_or_default();
            let new_norm = new_raw.as_deref().map(normalize_amount).unwrap_or_default();

            if old_norm.is_empty() || new_norm.is_empty() {
                debug!(
                    "字段 '{}' (第 {} 页) 第 {} 个位置没有有效值，跳过",
                    def.label, page_number, index
                );
                return None;
            }

            let pass = match def.policy {
                FieldPolicy::MustDiffer { .. } => old_norm != new_norm,
                _ => old_norm == new_norm,
            };
            Some(verdict(def, page_number, old_raw, new_raw, pass))
        }
        FieldPolicy::MustMatchWhole => {
            let old_text = joined(&old.tokens);
            let new_text = joined(&new.tokens);
            let pass = collapse_whitespace(&old_text) == collapse_whitespace(&new_text);
            Some(verdict(def, page_number, Some(old_text), Some(new_text), pass))
        }
        FieldPolicy::Custom { predicate } => {
            let pass = run_predicate(*predicate, &old.tokens, &new.tokens);
            Some(verdict(
                def,
                page_number,
                Some(joined(&old.tokens)),
                Some(joined(&new.tokens)),
                pass,
            ))
        }
    }
}

pub fn run_predicate(predicate: PredicateId, old: &[Token], new: &[Token]) -> bool {
    match predicate {
        PredicateId::FixedRecurringCost => fixed_recurring_cost(old, new),
    }
}

/// 固定周期费用：
/// - 任一侧少于两个片段 → 不通过
/// - "N dagen" 两侧都有则天数必须一致，只有一侧有 → 不通过
/// - 最右侧金额必须变化
fn fixed_recurring_cost(old: &[Token], new: &[Token]) -> bool {
    if old.len() < 2 || new.len() < 2 {
        return false;
    }

    let old_text = joined(old);
    let new_text = joined(new);
    let old_days = DAY_COUNT.captures(&old_text).map(|c| c[1].to_string());
    let new_days = DAY_COUNT.captures(&new_text).map(|c| c[1].to_string());

    match (old_days, new_days) {
        (Some(o), Some(n)) if o != n => return false,
        (Some(_), None) | (None, Some(_)) => return false,
        _ => {}
    }

    let old_cost = old.last().map(|t| normalize_amount(&t.text));
    let new_cost = new.last().map(|t| normalize_amount(&t.text));
    old_cost != new_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(label: &str, parts: &[&str]) -> FieldMatch {
        FieldMatch {
            key: label.to_string(),
            tokens: parts
                .iter()
                .enumerate()
                .map(|(i, p)| Token::new(*p, 72.0 + i as f64 * 100.0, 300.0))
                .collect(),
        }
    }

    fn def(policy: FieldPolicy) -> SpecialFieldDefinition {
        SpecialFieldDefinition::new("Door jou te betalen", policy, "Must Differ")
    }

    #[test]
    fn must_differ_fails_when_amount_unchanged() {
        let d = def(FieldPolicy::MustDiffer { index: 2 });
        let old = field(&d.label, &["Door jou te betalen", "totaal", "€ 1.234,56"]);
        let same = field(&d.label, &["Door jou te betalen", "totaal", "€1234,56"]);
        let changed = field(&d.label, &["Door jou te betalen", "totaal", "€ 1.300,00"]);

        let v = evaluate_field(&d, &old, &same, 1).unwrap();
        assert_eq!(v.result, VerdictResult::Fail);
        assert_eq!(v.key, "Door jou te betalen (Page 1)");

        let v = evaluate_field(&d, &old, &changed, 1).unwrap();
        assert_eq!(v.result, VerdictResult::Pass);
        assert_eq!(v.old_value, "€ 1.234,56");
        assert_eq!(v.new_value, "€ 1.300,00");
    }

    #[test]
    fn missing_index_produces_no_verdict() {
        let d = def(FieldPolicy::MustDiffer { index: 2 });
        let old = field(&d.label, &["Door jou te betalen", "€ 10,00"]);
        let new = field(&d.label, &["Door jou te betalen", "x", "€ 12,00"]);
        assert!(evaluate_field(&d, &old, &new, 1).is_none());
    }

    #[test]
    fn must_match_at_requires_equal_amount() {
        let d = def(FieldPolicy::MustMatchAt { index: 1 });
        let old = field(&d.label, &["Label", "€ 5,00"]);
        let new = field(&d.label, &["Label", "€5,00"]);
        assert_eq!(evaluate_field(&d, &old, &new, 2).unwrap().result, VerdictResult::Pass);
    }

    #[test]
    fn must_match_whole_ignores_whitespace_runs_only() {
        let d = def(FieldPolicy::MustMatchWhole);
        let old = field(&d.label, &["Netbeheerkosten", "€  45,00"]);
        let same = field(&d.label, &["Netbeheerkosten", "€ 45,00"]);
        let diff = field(&d.label, &["Netbeheerkosten", "€ 46,00"]);
        assert_eq!(evaluate_field(&d, &old, &same, 1).unwrap().result, VerdictResult::Pass);
        assert_eq!(evaluate_field(&d, &old, &diff, 1).unwrap().result, VerdictResult::Fail);
    }

    #[test]
    fn recurring_cost_passes_with_same_days_and_new_cost() {
        let old = field("Vaste", &["Vaste leveringskosten voor stroom", "30 dagen", "€12,34"]);
        let new = field("Vaste", &["Vaste leveringskosten voor stroom", "30 dagen", "€56,78"]);
        assert!(fixed_recurring_cost(&old.tokens, &new.tokens));
    }

    #[test]
    fn recurring_cost_fails_when_days_change() {
        let old = field("Vaste", &["Vaste leveringskosten voor stroom", "30 dagen", "€12,34"]);
        let new = field("Vaste", &["Vaste leveringskosten voor stroom", "25 dagen", "€56,78"]);
        assert!(!fixed_recurring_cost(&old.tokens, &new.tokens));
    }

    #[test]
    fn recurring_cost_fails_when_days_on_one_side_or_cost_unchanged() {
        let old = field("Vaste", &["Vaste leveringskosten voor gas", "30 dagen", "€12,34"]);
        let no_days = field("Vaste", &["Vaste leveringskosten voor gas", "€56,78"]);
        let same_cost = field("Vaste", &["Vaste leveringskosten voor gas", "30 dagen", "€ 12,34"]);
        assert!(!fixed_recurring_cost(&old.tokens, &no_days.tokens));
        assert!(!fixed_recurring_cost(&old.tokens, &same_cost.tokens));
        assert!(!fixed_recurring_cost(&old.tokens[..1], &no_days.tokens));
    }

    #[test]
    fn custom_verdict_reports_joined_lines() {
        let d = SpecialFieldDefinition::new(
            "Vaste leveringskosten voor gas",
            FieldPolicy::Custom {
                predicate: PredicateId::FixedRecurringCost,
            },
            "BFDC Must Differ",
        );
        let old = field(&d.label, &["Vaste leveringskosten voor gas", "30 dagen", "€12,34"]);
        let new = field(&d.label, &["Vaste leveringskosten voor gas", "30 dagen", "€56,78"]);
        let v = evaluate_field(&d, &old, &new, 3).unwrap();
        assert_eq!(v.result, VerdictResult::Pass);
        assert_eq!(v.old_value, "Vaste leveringskosten voor gas 30 dagen €12,34");
        assert_eq!(v.group, "BFDC Must Differ");
    }

    #[test]
    fn amount_normalization() {
        assert_eq!(normalize_amount("€ 1.234,56"), "123456");
        assert_eq!(normalize_amount(" - "), "-");
    }
}
