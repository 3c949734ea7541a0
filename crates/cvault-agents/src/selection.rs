use std::collections::HashSet;

use cvault_models::AnalystRuntimeConfig;

/// A parsed selection expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// `all` or `*`
    All,
    /// `all,-x,-y`; the leading `-` is optional.
    AllExcept(Vec<String>),
    /// `a-b`, inclusive priority ordinals.
    Range(u32, u32),
    /// `a,b,c`, in the given order.
    List(Vec<String>),
}

impl Selection {
    pub fn parse(expr: &str) -> Selection {
        let expr = expr.trim();
        let lowered = expr.to_ascii_lowercase();

        if lowered == "all" || lowered == "*" {
            return Selection::All;
        }

        if let Some(rest) = lowered
            .strip_prefix("all,")
            .or_else(|| lowered.strip_prefix("*,"))
        {
            let excluded = rest
                .split(',')
                .map(|item| item.trim().trim_start_matches('-').trim().to_string())
                .filter(|id| !id.is_empty())
                .collect();
            return Selection::AllExcept(excluded);
        }

        if let Some((lo, hi)) = lowered.split_once('-') {
            if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) {
                return Selection::Range(lo, hi);
            }
        }

        Selection::List(
            lowered
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// Pick analysts from `candidates` (registry order). Disabled analysts
    /// never survive selection. May return an empty list.
    pub fn apply(&self, candidates: &[AnalystRuntimeConfig]) -> Vec<AnalystRuntimeConfig> {
        match self {
            Selection::All => by_priority(candidates.iter().filter(|a| a.enabled)),
            Selection::AllExcept(excluded) => by_priority(
                candidates
                    .iter()
                    .filter(|a| a.enabled && !excluded.iter().any(|x| x == a.id())),
            ),
            Selection::Range(lo, hi) => by_priority(
                candidates
                    .iter()
                    .filter(|a| a.enabled && (*lo..=*hi).contains(&a.priority.0)),
            ),
            Selection::List(ids) => {
                let mut seen = HashSet::new();
                ids.iter()
                    .filter(|id| seen.insert(id.as_str()))
                    .filter_map(|id| candidates.iter().find(|a| a.id() == id))
                    .filter(|a| a.enabled)
                    .cloned()
                    .collect()
            }
        }
    }
}

/// Stable sort by priority, so equal priorities keep registry order.
pub(crate) fn by_priority<'a>(
    analysts: impl Iterator<Item = &'a AnalystRuntimeConfig>,
) -> Vec<AnalystRuntimeConfig> {
    let mut selected: Vec<AnalystRuntimeConfig> = analysts.cloned().collect();
    selected.sort_by_key(|a| a.priority);
    selected
}
