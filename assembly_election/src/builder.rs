use snafu::ensure;

use crate::config::*;
use crate::error::*;
use crate::store::{MemoryStore, Tables};
use crate::Engine;

/// A builder for setting up an engine with its offices and its roster.
///
/// ```
/// pub use assembly_election::builder::EngineBuilder;
/// pub use assembly_election::ElectionRules;
/// # use assembly_election::ElectionError;
///
/// let mut builder = EngineBuilder::new(&ElectionRules::DEFAULT_RULES)?
///     .offices(&["President".to_string(), "Treasurer".to_string()])?;
///
/// builder.add_member("Ana Lima", "ana@example.org")?;
/// builder.add_administrator("Rui Costa", "rui@example.org")?;
///
/// let engine = builder.build();
/// assert_eq!(engine.members().len(), 2);
///
/// # Ok::<(), ElectionError>(())
/// ```
pub struct EngineBuilder {
    pub(crate) _rules: ElectionRules,
    pub(crate) _tables: Tables,
}

impl EngineBuilder {
    /// A builder with the default list of offices.
    ///
    /// Fails with [`ElectionError::InvalidRules`] unless the rules have at least one round and
    /// at least one finalist.
    pub fn new(rules: &ElectionRules) -> ElectionResult<EngineBuilder> {
        ensure!(
            rules.final_round >= 1 && rules.runoff_size >= 1,
            InvalidRulesSnafu {
                final_round: rules.final_round,
                runoff_size: rules.runoff_size,
            }
        );
        let names: Vec<String> = DEFAULT_OFFICES.iter().map(|s| s.to_string()).collect();
        Ok(EngineBuilder {
            _rules: rules.clone(),
            _tables: Tables::new(&names),
        })
    }

    /// Replaces the offices, given in voting order.
    ///
    /// Members added before are dropped: call this first.
    pub fn offices(self, names: &[String]) -> ElectionResult<EngineBuilder> {
        Ok(EngineBuilder {
            _rules: self._rules,
            _tables: Tables::new(names),
        })
    }

    /// Adds an ordinary member, who may vote and stand for an office.
    pub fn add_member(&mut self, full_name: &str, email: &str) -> ElectionResult<MemberId> {
        Ok(self
            ._tables
            .insert_member(full_name, email, Role::Member)
            .id)
    }

    /// Adds an administrator. Administrators run the session and may vote when present, but
    /// never stand for an office.
    pub fn add_administrator(&mut self, full_name: &str, email: &str) -> ElectionResult<MemberId> {
        Ok(self
            ._tables
            .insert_member(full_name, email, Role::Administrator)
            .id)
    }

    pub fn build(self) -> Engine<MemoryStore> {
        Engine::with_store(MemoryStore::new(self._tables), &self._rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_follows_offices() {
        let mut builder = EngineBuilder::new(&ElectionRules::DEFAULT_RULES)
            .unwrap()
            .offices(&["Treasurer".to_string()])
            .unwrap();
        let ana = builder.add_member("Ana", "ana@example.org").unwrap();
        let rui = builder.add_administrator("Rui", "rui@example.org").unwrap();
        assert_ne!(ana, rui);

        let engine = builder.build();
        let names: Vec<String> = engine.offices().into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["Treasurer".to_string()]);
        let roles: Vec<Role> = engine.members().into_iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Member, Role::Administrator]);
    }

    #[test]
    fn default_offices() {
        let engine = EngineBuilder::new(&ElectionRules::DEFAULT_RULES)
            .unwrap()
            .build();
        assert_eq!(engine.offices().len(), DEFAULT_OFFICES.len());
        assert_eq!(engine.rules(), &ElectionRules::DEFAULT_RULES);
    }

    #[test]
    fn rules_need_a_round_and_a_finalist() {
        for (final_round, runoff_size) in [(0, 2), (3, 0)] {
            let rules = ElectionRules {
                final_round,
                runoff_size,
            };
            let r = EngineBuilder::new(&rules);
            assert_eq!(
                r.err().map(|e| e.kind()),
                Some(ErrorKind::InvalidRules)
            );
        }
        let plurality_only = ElectionRules {
            final_round: 1,
            runoff_size: 1,
        };
        assert!(EngineBuilder::new(&plurality_only).is_ok());
    }
}
