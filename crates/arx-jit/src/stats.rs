//! Runtime counters for the lookup/translate/chain pipeline.

use std::fmt;

#[derive(Debug, Default, Clone)]
pub struct JitStats {
    pub lookups: u64,
    pub hits: u64,
    pub translated: u64,
    pub retired_insns: u64,
    pub nop_fallbacks: u64,
    pub chained: u64,
    pub flushes: u64,
    pub overflow_aborts: u64,
}

fn pct(n: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        n as f64 / total as f64 * 100.0
    }
}

impl fmt::Display for JitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== jit stats ===")?;
        writeln!(
            f,
            "lookups:     {} ({:.1}% hit)",
            self.lookups,
            pct(self.hits, self.lookups)
        )?;
        writeln!(f, "translated:  {}", self.translated)?;
        writeln!(f, "retired:     {}", self.retired_insns)?;
        writeln!(f, "nop words:   {}", self.nop_fallbacks)?;
        writeln!(f, "chained:     {}", self.chained)?;
        writeln!(f, "flushes:     {}", self.flushes)?;
        writeln!(f, "overflow:    {}", self.overflow_aborts)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_hit_rate() {
        let stats = JitStats {
            lookups: 10,
            hits: 5,
            ..Default::default()
        };
        let s = stats.to_string();
        assert!(s.contains("50.0% hit"), "{s}");
    }
}
