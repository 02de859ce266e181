use anyhow::Result;
use serde::Serialize;

use crate::paths::{PathInfo, RecordLanguage};
use crate::store::{RedirectRule, RedirectStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectAction {
    Created,
    Kept,
    Overwritten,
    SkippedAmbiguous,
}

impl RedirectAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Kept => "kept",
            Self::Overwritten => "overwritten",
            Self::SkippedAmbiguous => "skipped_ambiguous",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RedirectOutcome {
    pub source: String,
    pub target: String,
    pub action: RedirectAction,
    pub rule_id: Option<i64>,
    /// Target the rule pointed at before an overwrite, absent otherwise.
    pub previous_target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedRedirect {
    Create,
    Keep { rule_id: i64 },
    Overwrite { rule_id: i64 },
    SkipAmbiguous { rule_count: usize },
}

/// Decide what to do for one legacy source given the rules currently on
/// record. Only the 0-or-1-match cases are ever touched; multiple matches
/// mean another writer owns the source.
pub fn plan_redirect(target: &str, existing: &[RedirectRule]) -> PlannedRedirect {
    match existing {
        [] => PlannedRedirect::Create,
        [rule] if rule.target == target => PlannedRedirect::Keep { rule_id: rule.id },
        [rule] => PlannedRedirect::Overwrite { rule_id: rule.id },
        rules => PlannedRedirect::SkipAmbiguous {
            rule_count: rules.len(),
        },
    }
}

/// Merge the file's legacy redirect sources into the store. Rule state is
/// re-read immediately before each write, so overlapping runs converge
/// instead of clobbering each other.
pub fn apply_redirects(
    info: &PathInfo,
    store: &mut dyn RedirectStore,
) -> Result<Vec<RedirectOutcome>> {
    let mut outcomes = Vec::new();
    for source in info.legacy_redirect_sources() {
        let existing = store.find_by_source(&source)?;
        let (action, rule_id, previous_target) =
            match plan_redirect(&info.canonical_path, &existing) {
                PlannedRedirect::Create => {
                    let id =
                        store.create(&source, &info.canonical_path, RecordLanguage::Neutral)?;
                    (RedirectAction::Created, Some(id), None)
                }
                PlannedRedirect::Keep { rule_id } => (RedirectAction::Kept, Some(rule_id), None),
                PlannedRedirect::Overwrite { rule_id } => {
                    let previous = existing.first().map(|rule| rule.target.clone());
                    store.update_target(rule_id, &info.canonical_path)?;
                    (RedirectAction::Overwritten, Some(rule_id), previous)
                }
                PlannedRedirect::SkipAmbiguous { .. } => {
                    (RedirectAction::SkippedAmbiguous, None, None)
                }
            };
        outcomes.push(RedirectOutcome {
            source,
            target: info.canonical_path.clone(),
            action,
            rule_id,
            previous_target,
        });
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::{PlannedRedirect, RedirectAction, apply_redirects, plan_redirect};
    use crate::paths::{PassLanguage, RecordLanguage, path_info};
    use crate::store::{MemoryRedirectStore, RedirectRule, RedirectStore};

    fn rule(id: i64, source: &str, target: &str) -> RedirectRule {
        RedirectRule {
            id,
            source: source.to_string(),
            target: target.to_string(),
            language: "neutral".to_string(),
        }
    }

    #[test]
    fn plan_covers_all_rule_counts() {
        assert_eq!(plan_redirect("a.html", &[]), PlannedRedirect::Create);
        assert_eq!(
            plan_redirect("a.html", &[rule(3, "a.jis.html", "a.html")]),
            PlannedRedirect::Keep { rule_id: 3 }
        );
        assert_eq!(
            plan_redirect("a.html", &[rule(3, "a.jis.html", "old.html")]),
            PlannedRedirect::Overwrite { rule_id: 3 }
        );
        assert_eq!(
            plan_redirect(
                "a.html",
                &[
                    rule(3, "a.jis.html", "x.html"),
                    rule(4, "a.jis.html", "y.html")
                ]
            ),
            PlannedRedirect::SkipAmbiguous { rule_count: 2 }
        );
    }

    #[test]
    fn repeated_apply_is_idempotent() {
        let mut store = MemoryRedirectStore::new();
        let info = path_info("news/report.jis.html", PassLanguage::Japanese);

        let first = apply_redirects(&info, &mut store).expect("first apply");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].action, RedirectAction::Created);
        assert_eq!(first[0].source, "news/report.jis.html");
        assert_eq!(first[0].target, "news/report.html");

        let second = apply_redirects(&info, &mut store).expect("second apply");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].action, RedirectAction::Kept);
        assert_eq!(second[0].rule_id, first[0].rule_id);
        assert_eq!(store.rules().len(), 1);
    }

    #[test]
    fn directory_index_yields_two_rules() {
        let mut store = MemoryRedirectStore::new();
        let info = path_info("info/index.jis.html", PassLanguage::Japanese);

        let outcomes = apply_redirects(&info, &mut store).expect("apply");
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].source, "info/index.jis.html");
        assert_eq!(outcomes[1].source, "info");
        assert!(outcomes.iter().all(|o| o.target == "info/index.html"));
        assert_eq!(store.rules().len(), 2);
    }

    #[test]
    fn single_differing_rule_is_overwritten_in_place() {
        let mut store = MemoryRedirectStore::new();
        let seeded = store
            .create("a.jis.html", "old.html", RecordLanguage::Neutral)
            .expect("seed");

        let info = path_info("a.jis.html", PassLanguage::Japanese);
        let outcomes = apply_redirects(&info, &mut store).expect("apply");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].action, RedirectAction::Overwritten);
        assert_eq!(outcomes[0].rule_id, Some(seeded));
        assert_eq!(outcomes[0].previous_target.as_deref(), Some("old.html"));

        assert_eq!(store.rules().len(), 1);
        assert_eq!(store.rules()[0].target, "a.html");
    }

    #[test]
    fn ambiguous_sources_are_left_untouched() {
        let mut store = MemoryRedirectStore::new();
        store
            .create("a.jis.html", "x.html", RecordLanguage::Neutral)
            .expect("seed one");
        store
            .create("a.jis.html", "y.html", RecordLanguage::Neutral)
            .expect("seed two");

        let info = path_info("a.jis.html", PassLanguage::Japanese);
        let outcomes = apply_redirects(&info, &mut store).expect("apply");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].action, RedirectAction::SkippedAmbiguous);
        assert_eq!(outcomes[0].rule_id, None);

        let targets: Vec<&str> = store.rules().iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["x.html", "y.html"]);
    }
}
