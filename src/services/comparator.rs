//! 文档比对服务 - 业务能力层
//!
//! 比对流程：页面对齐 → 特殊字段评估 → 剩余行逐行比对 → 汇总结论
//!
//! 普通行一致时不输出任何结论（默认通过），只报告异常；
//! 特殊字段无论通过与否都会输出结论，便于审计。

use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use crate::models::document::{Line, Page, ParsedDocument, Token};
use crate::models::field::FieldRuleSet;
use crate::models::outcome::{FieldVerdict, OverallResult, NOT_AVAILABLE};
use crate::services::field_rules::evaluate_field;
use crate::services::line_assembler::assemble_lines;

pub const GROUP_PAGE_STRUCTURE: &str = "Page Structure";
pub const GROUP_REMAINING_LINES: &str = "Remaining Lines";

/// 比对参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareSettings {
    /// 新旧行匹配时允许的纵坐标差
    pub line_y_tolerance: f64,
    /// 行分组时纵坐标的取整精度
    pub line_group_precision: f64,
}

impl Default for CompareSettings {
    fn default() -> Self {
        Self {
            line_y_tolerance: 1.0,
            line_group_precision: 0.1,
        }
    }
}

/// 比对报告
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    pub overall_result: OverallResult,
    pub verdicts: Vec<FieldVerdict>,
    /// 页数不一致
    pub structural_mismatch: bool,
}

/// 文档比对器
pub struct Comparator {
    rules: Arc<FieldRuleSet>,
    settings: CompareSettings,
}

impl Comparator {
    pub fn new(rules: Arc<FieldRuleSet>, settings: CompareSettings) -> Self {
        Self { rules, settings }
    }

    pub fn compare(&self, old: &ParsedDocument, new: &ParsedDocument) -> ComparisonReport {
        let mut verdicts = Vec::new();

        // ========== 页面对齐 ==========
        let structural_mismatch = old.page_count() != new.page_count();
        if structural_mismatch {
            verdicts.push(FieldVerdict::fail(
                "Page Count",
                format!("{} pages", old.page_count()),
                format!("{} pages", new.page_count()),
                GROUP_PAGE_STRUCTURE,
            ));
        }

        let max_pages = old.page_count().max(new.page_count());
        for page_index in 0..max_pages {
            let page_number = page_index + 1;
            match (old.pages.get(page_index), new.pages.get(page_index)) {
                (Some(_), None) => verdicts.push(FieldVerdict::fail(
                    format!("Page {}", page_number),
                    "Page exists",
                    "Page does not exist (Removed)",
                    GROUP_PAGE_STRUCTURE,
                )),
                (None, Some(_)) => verdicts.push(FieldVerdict::fail(
                    format!("Page {}", page_number),
                    "Page does not exist (Added)",
                    "Page exists",
                    GROUP_PAGE_STRUCTURE,
                )),
                (Some(old_page), Some(new_page)) => {
                    self.compare_page(old_page, new_page, page_number, &mut verdicts);
                }
                (None, None) => {}
            }
        }

        // ========== 汇总 ==========
        let any_fail = verdicts.iter().any(FieldVerdict::is_fail);
        let overall_result = if any_fail || structural_mismatch {
            OverallResult::Fail
        } else {
            OverallResult::Pass
        };

        ComparisonReport {
            overall_result,
            verdicts,
            structural_mismatch,
        }
    }

    fn compare_page(&self, old: &Page, new: &Page, page_number: usize, verdicts: &mut Vec<FieldVerdict>) {
        let claimed = self.evaluate_fields(old, new, page_number, verdicts);
        trace!("第 {} 页特殊字段占用 {} 个纵坐标", page_number, claimed.len());
        self.diff_lines(old, new, &claimed, page_number, verdicts);
    }

    /// 评估两侧都定位到的特殊字段，返回被占用的纵坐标
    fn evaluate_fields(
        &self,
        old: &Page,
        new: &Page,
        page_number: usize,
        verdicts: &mut Vec<FieldVerdict>,
    ) -> HashSet<u64> {
        let mut claimed = HashSet::new();

        for old_field in &old.fields {
            let Some(new_field) = new.field(&old_field.key) else {
                continue;
            };
            let Some(def) = self.rules.get(&old_field.key) else {
                continue;
            };

            for token in old_field.tokens.iter().chain(new_field.tokens.iter()) {
                claimed.insert(token.y.to_bits());
            }

            if let Some(verdict) = evaluate_field(def, old_field, new_field, page_number) {
                verdicts.push(verdict);
            }
        }

        claimed
    }

    fn diff_lines(
        &self,
        old: &Page,
        new: &Page,
        claimed: &HashSet<u64>,
        page_number: usize,
        verdicts: &mut Vec<FieldVerdict>,
    ) {
        let old_lines = self.unclaimed_lines(&old.tokens, claimed);
        let new_lines = self.unclaimed_lines(&new.tokens, claimed);
        let mut matched = vec![false; new_lines.len()];

        for (line_index, old_line) in old_lines.iter().enumerate() {
            let candidate = new_lines
                .iter()
                .position(|nl| (nl.y - old_line.y).abs() < self.settings.line_y_tolerance);

            let old_text = normalize_line(&old_line.text);
            let new_text = candidate
                .map(|i| normalize_line(&new_lines[i].text))
                .unwrap_or_default();

            if old_text != new_text {
                verdicts.push(
                    FieldVerdict::fail(
                        format!("Line {} (Page {})", line_index + 1, page_number),
                        old_line.text.clone(),
                        candidate
                            .map(|i| new_lines[i].text.clone())
                            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                        GROUP_REMAINING_LINES,
                    )
                    .at_y(old_line.y),
                );
            }

            if let Some(i) = candidate {
                matched[i] = true;
            }
        }

        let added = new_lines
            .iter()
            .zip(matched.iter())
            .filter(|(_, &was_matched)| !was_matched)
            .map(|(line, _)| line);

        for (idx, line) in added.enumerate() {
            let key = format!("New Line {} (Page {}) on Y:{:.2}", idx + 1, page_number, line.y);
            verdicts.push(
                FieldVerdict::fail(key, NOT_AVAILABLE, line.text.clone(), GROUP_REMAINING_LINES)
                    .at_y(line.y),
            );
        }
    }

    fn unclaimed_lines(&self, tokens: &[Token], claimed: &HashSet<u64>) -> Vec<Line> {
        let mut lines = assemble_lines(
            tokens.iter().filter(|t| !claimed.contains(&t.y.to_bits())),
            self.settings.line_group_precision,
        );
        lines.sort_by(|a, b| a.y.total_cmp(&b.y));
        lines
    }
}

/// 行文本归一化：欧元符号与空白折叠为单个空格
fn normalize_line(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_gap = false;
    for c in text.chars() {
        if c == '€' || c.is_whitespace() {
            in_gap = true;
        } else {
            if in_gap && !out.is_empty() {
                out.push(' ');
            }
            in_gap = false;
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field::{FieldPolicy, SpecialFieldDefinition};
    use crate::models::outcome::VerdictResult;
    use crate::services::extractor::DocumentExtractor;

    fn rules() -> Arc<FieldRuleSet> {
        Arc::new(FieldRuleSet::new(vec![
            SpecialFieldDefinition::new(
                "Door jou te betalen",
                FieldPolicy::MustDiffer { index: 1 },
                "Must Differ",
            ),
            SpecialFieldDefinition::new(
                "In rekening gebrachte termijnbedragen",
                FieldPolicy::MustMatchWhole,
                "Must Match",
            ),
        ]))
    }

    fn page(rules: &Arc<FieldRuleSet>, rows: &[(f64, &[&str])]) -> Page {
        let mut tokens = Vec::new();
        for (y, parts) in rows {
            for (i, part) in parts.iter().enumerate() {
                tokens.push(Token::new(*part, 72.0 + i as f64 * 120.0, *y));
            }
        }
        DocumentExtractor::new(rules.clone()).build_page(tokens)
    }

    fn invoice(rules: &Arc<FieldRuleSet>, amount: &str) -> Page {
        page(
            rules,
            &[
                (50.0, &["Factuur", "2024-10"]),
                (80.0, &["Door jou te betalen", amount]),
                (110.0, &["In rekening gebrachte termijnbedragen", "€ 90,00"]),
                (140.0, &["Klantnummer", "123456"]),
            ],
        )
    }

    fn doc(pages: Vec<Page>) -> ParsedDocument {
        ParsedDocument { pages }
    }

    #[test]
    fn identical_documents_without_fields_pass_silently() {
        let rules = Arc::new(FieldRuleSet::empty());
        let p = page(&rules, &[(50.0, &["Factuur"]), (70.0, &["Totaal", "€ 10,00"])]);
        let comparator = Comparator::new(rules, CompareSettings::default());
        let report = comparator.compare(&doc(vec![p.clone()]), &doc(vec![p]));
        assert_eq!(report.overall_result, OverallResult::Pass);
        assert!(report.verdicts.is_empty());
    }

    #[test]
    fn special_fields_always_reported_and_claim_their_lines() {
        let rules = rules();
        let comparator = Comparator::new(rules.clone(), CompareSettings::default());
        let report = comparator.compare(
            &doc(vec![invoice(&rules, "€ 100,00")]),
            &doc(vec![invoice(&rules, "€ 120,00")]),
        );
        assert_eq!(report.overall_result, OverallResult::Pass);
        assert_eq!(report.verdicts.len(), 2);
        assert!(report.verdicts.iter().all(|v| v.result == VerdictResult::Pass));
        assert!(report.verdicts.iter().all(|v| v.group != GROUP_REMAINING_LINES));
    }

    #[test]
    fn unchanged_must_differ_amount_fails() {
        let rules = rules();
        let comparator = Comparator::new(rules.clone(), CompareSettings::default());
        let report = comparator.compare(
            &doc(vec![invoice(&rules, "€ 100,00")]),
            &doc(vec![invoice(&rules, "€100,00")]),
        );
        assert_eq!(report.overall_result, OverallResult::Fail);
        let fails: Vec<_> = report.verdicts.iter().filter(|v| v.is_fail()).collect();
        assert_eq!(fails.len(), 1);
        assert_eq!(fails[0].key, "Door jou te betalen (Page 1)");
    }

    #[test]
    fn changed_line_and_added_line_are_reported() {
        let rules = Arc::new(FieldRuleSet::empty());
        let old = page(&rules, &[(50.0, &["Factuur"]), (70.0, &["Klant", "A"])]);
        let new = page(
            &rules,
            &[(50.0, &["Factuur"]), (70.5, &["Klant", "B"]), (300.0, &["Extra", "regel"])],
        );
        let comparator = Comparator::new(rules, CompareSettings::default());
        let report = comparator.compare(&doc(vec![old]), &doc(vec![new]));

        assert_eq!(report.overall_result, OverallResult::Fail);
        assert_eq!(report.verdicts.len(), 2);
        assert_eq!(report.verdicts[0].key, "Line 2 (Page 1)");
        assert_eq!(report.verdicts[0].old_value, "Klant A");
        assert_eq!(report.verdicts[0].new_value, "Klant B");
        assert_eq!(report.verdicts[0].y, Some(70.0));
        assert_eq!(report.verdicts[1].key, "New Line 1 (Page 1) on Y:300.00");
        assert_eq!(report.verdicts[1].old_value, NOT_AVAILABLE);
    }

    #[test]
    fn missing_new_line_reports_not_available() {
        let rules = Arc::new(FieldRuleSet::empty());
        let old = page(&rules, &[(50.0, &["Factuur"]), (90.0, &["Verwijderd"])]);
        let new = page(&rules, &[(50.0, &["Factuur"])]);
        let comparator = Comparator::new(rules, CompareSettings::default());
        let report = comparator.compare(&doc(vec![old]), &doc(vec![new]));
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.verdicts[0].new_value, NOT_AVAILABLE);
    }

    #[test]
    fn euro_sign_and_spacing_noise_is_ignored() {
        assert_eq!(normalize_line("Totaal €  12,34"), "Totaal 12,34");
        assert_eq!(normalize_line("Totaal 12,34 "), "Totaal 12,34");
        assert_eq!(normalize_line("€12,34"), "12,34");
    }

    #[test]
    fn page_count_mismatch_degrades_to_verdicts() {
        let rules = Arc::new(FieldRuleSet::empty());
        let p = page(&rules, &[(50.0, &["Factuur"])]);
        let comparator = Comparator::new(rules, CompareSettings::default());
        let report = comparator.compare(
            &doc(vec![p.clone(), p.clone(), p.clone()]),
            &doc(vec![p.clone(), p]),
        );

        assert!(report.structural_mismatch);
        assert_eq!(report.overall_result, OverallResult::Fail);
        assert!(report
            .verdicts
            .iter()
            .any(|v| v.key == "Page Count" && v.group == GROUP_PAGE_STRUCTURE));
        let page3 = report.verdicts.iter().find(|v| v.key == "Page 3").unwrap();
        assert_eq!(page3.result, VerdictResult::Fail);
        assert_eq!(page3.new_value, "Page does not exist (Removed)");
    }

    #[test]
    fn tolerance_is_configurable() {
        let rules = Arc::new(FieldRuleSet::empty());
        let old = page(&rules, &[(70.0, &["Regel"])]);
        let new = page(&rules, &[(72.0, &["Regel"])]);
        let strict = Comparator::new(rules.clone(), CompareSettings::default());
        assert_eq!(
            strict.compare(&doc(vec![old.clone()]), &doc(vec![new.clone()])).overall_result,
            OverallResult::Fail
        );
        let loose = Comparator::new(
            rules,
            CompareSettings {
                line_y_tolerance: 3.0,
                ..CompareSettings::default()
            },
        );
        assert_eq!(
            loose.compare(&doc(vec![old]), &doc(vec![new])).overall_result,
            OverallResult::Pass
        );
    }
}
