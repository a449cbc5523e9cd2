use crate::table::Table;

/// Summary counters shown next to the roster.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RosterStats {
    pub total: usize,
    pub scored: usize,
    pub highest: Option<ScoreExtreme>,
    pub lowest: Option<ScoreExtreme>,
}

/// A score and every student who has it, in table order.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoreExtreme {
    pub score: f64,
    pub names: Vec<String>,
}

impl ScoreExtreme {
    /// `"An, Bình, Cúc and 2 others"` for `limit == 3`.
    pub fn preview(&self, limit: usize) -> String {
        let shown = self.names.len().min(limit);
        let mut out = self.names[..shown].join(", ");
        let rest = self.names.len() - shown;
        if rest > 0 {
            let noun = if rest == 1 { "other" } else { "others" };
            if shown > 0 {
                out.push(' ');
            }
            out.push_str(&format!("and {rest} {noun}"));
        }
        out
    }
}

impl RosterStats {
    pub fn compute(table: &Table) -> Self {
        let scored: Vec<(f64, &str)> = table
            .records()
            .filter_map(|r| r.score().map(|s| (s, r.name())))
            .collect();

        let extreme = |pick: fn(f64, f64) -> f64| {
            let score = scored.iter().map(|(s, _)| *s).reduce(pick)?;
            Some(ScoreExtreme {
                score,
                names: scored
                    .iter()
                    .filter(|(s, _)| *s == score)
                    .map(|(_, name)| name.to_string())
                    .collect(),
            })
        };

        Self {
            total: table.len(),
            scored: scored.len(),
            highest: extreme(f64::max),
            lowest: extreme(f64::min),
        }
    }
}
