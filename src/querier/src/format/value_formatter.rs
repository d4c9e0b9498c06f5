/// How sample values are written out, chosen once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueFormatter {
    /// Full precision, shortest round-trip form
    #[default]
    Machine,
    /// Two decimals with an SI suffix
    Human,
}

/// Ascending; index 2 is the unscaled unit.
const UNITS: [(f64, &str); 8] = [
    (1e-6, "µ"),
    (1e-3, "m"),
    (1.0, ""),
    (1e3, "k"),
    (1e6, "M"),
    (1e9, "G"),
    (1e12, "T"),
    (1e15, "P"),
];
const UNSCALED: usize = 2;

impl ValueFormatter {
    pub fn format(self, value: f64) -> String {
        match self {
            ValueFormatter::Machine => value.to_string(),
            ValueFormatter::Human => human(value),
        }
    }

    pub fn is_human(self) -> bool {
        self == ValueFormatter::Human
    }
}

fn human(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let magnitude = value.abs();
    let mut unit = if magnitude >= 1e3 {
        UNITS.iter().rposition(|(factor, _)| magnitude >= *factor).unwrap_or(UNSCALED)
    } else if magnitude > 0.0 && magnitude < 1e-2 {
        UNITS[..UNSCALED]
            .iter()
            .rposition(|(factor, _)| magnitude >= *factor)
            .unwrap_or(0)
    } else {
        UNSCALED
    };
    // Rounding can carry into the next unit, e.g. 999.999 -> 1000.00.
    while unit + 1 < UNITS.len() && (value / UNITS[unit].0 * 100.0).round().abs() >= 100_000.0 {
        unit += 1;
    }
    let (factor, suffix) = UNITS[unit];
    let scaled = value / factor;

    let fixed = format!("{scaled:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}{suffix}")
}
