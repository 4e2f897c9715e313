//! Formatting helpers for user-facing output.

/// Pluralize a quantity, as in "1 commit" or "3 commits".
pub struct Pluralize<'a> {
    /// The amount of the quantity.
    pub amount: usize,

    /// The string to render if the amount is singular.
    pub singular: &'a str,

    /// The string to render if the amount is plural.
    pub plural: &'a str,
}

impl std::fmt::Display for Pluralize<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.amount {
            1 => write!(f, "{} {}", self.amount, self.singular),
            _ => write!(f, "{} {}", self.amount, self.plural),
        }
    }
}
