//! Simulated user personas.

use serde::{Deserialize, Serialize};

/// Behavioural traits, each normalized to `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PersonaTraits {
    pub patience: f64,
    pub expertise: f64,
    pub verbosity: f64,
    pub frustration_tolerance: f64,
    pub clarity_of_communication: f64,
    pub technical_level: f64,
}

impl PersonaTraits {
    /// Traits with every value at the midpoint.
    pub fn neutral() -> Self {
        Self {
            patience: 0.5,
            expertise: 0.5,
            verbosity: 0.5,
            frustration_tolerance: 0.5,
            clarity_of_communication: 0.5,
            technical_level: 0.5,
        }
    }

    /// Named view over all traits, in declaration order.
    pub fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("patience", self.patience),
            ("expertise", self.expertise),
            ("verbosity", self.verbosity),
            ("frustration_tolerance", self.frustration_tolerance),
            ("clarity_of_communication", self.clarity_of_communication),
            ("technical_level", self.technical_level),
        ]
    }

    /// First trait outside `0.0..=1.0`, if any.
    pub fn first_out_of_range(&self) -> Option<(&'static str, f64)> {
        self.entries()
            .into_iter()
            .find(|(_, v)| !(0.0..=1.0).contains(v))
    }
}

/// A parameterized simulated user profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Persona {
    /// Catalog key.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Free-text description handed to utterance generators.
    #[serde(default)]
    pub description: String,

    #[serde(flatten)]
    pub traits: PersonaTraits,
}

impl Persona {
    pub fn new(id: &str, name: &str, traits: PersonaTraits) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            traits,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traits_flatten_into_persona_json() {
        let persona = Persona::new("p1", "Tester", PersonaTraits::neutral());
        let value = serde_json::to_value(&persona).unwrap();
        assert_eq!(value["id"], "p1");
        assert_eq!(value["patience"], 0.5);
        assert!(value.get("traits").is_none());
    }

    #[test]
    fn test_out_of_range_trait_detected() {
        let mut traits = PersonaTraits::neutral();
        traits.clarity_of_communication = 1.2;
        assert_eq!(
            traits.first_out_of_range(),
            Some(("clarity_of_communication", 1.2))
        );
        assert_eq!(PersonaTraits::neutral().first_out_of_range(), None);
    }
}
