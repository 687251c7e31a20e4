//! Developer tooling: read-only world inspection.
//!
//! # Invariants
//! - Tools never mutate the world they inspect.

pub mod inspector;

pub use inspector::{EntityInfo, WorldInspector, WorldSummary};

pub fn crate_info() -> &'static str {
    "roomworld-tools v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("tools"));
    }
}
