//! Persona and goal catalogs.
//!
//! A [`Catalog`] is a read-only table injected into the batch coordinator.
//! [`Catalog::builtin`] carries the memory-assistant evaluation matrix;
//! [`Catalog::load`] reads a TOML file with `[[personas]]` and `[[goals]]`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::domain::{Complexity, Goal, Persona, PersonaTraits, Result, SimError};

/// Personas and goals keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    #[serde(default)]
    pub personas: Vec<Persona>,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

impl Catalog {
    pub fn new(personas: Vec<Persona>, goals: Vec<Goal>) -> Result<Self> {
        let catalog = Self { personas, goals };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse and validate a TOML catalog.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let catalog: Catalog = toml::from_str(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Read a TOML catalog from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn persona(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn goal(&self, id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    pub fn persona_ids(&self) -> Vec<String> {
        self.personas.iter().map(|p| p.id.clone()).collect()
    }

    pub fn goal_ids(&self) -> Vec<String> {
        self.goals.iter().map(|g| g.id.clone()).collect()
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for persona in &self.personas {
            if !seen.insert(persona.id.as_str()) {
                return Err(SimError::InvalidCatalog(format!(
                    "duplicate persona id '{}'",
                    persona.id
                )));
            }
            if let Some((name, value)) = persona.traits.first_out_of_range() {
                return Err(SimError::InvalidCatalog(format!(
                    "persona '{}' trait {name}={value} outside [0, 1]",
                    persona.id
                )));
            }
        }

        let mut seen = HashSet::new();
        for goal in &self.goals {
            if !seen.insert(goal.id.as_str()) {
                return Err(SimError::InvalidCatalog(format!(
                    "duplicate goal id '{}'",
                    goal.id
                )));
            }
            if goal.opening_query.trim().is_empty() {
                return Err(SimError::InvalidCatalog(format!(
                    "goal '{}' has an empty opening query",
                    goal.id
                )));
            }
        }
        Ok(())
    }

    /// The memory-assistant evaluation matrix: six personas, five goals.
    pub fn builtin() -> Self {
        Self {
            personas: builtin_personas(),
            goals: builtin_goals(),
        }
    }
}

fn traits(
    patience: f64,
    expertise: f64,
    verbosity: f64,
    frustration_tolerance: f64,
    clarity_of_communication: f64,
    technical_level: f64,
) -> PersonaTraits {
    PersonaTraits {
        patience,
        expertise,
        verbosity,
        frustration_tolerance,
        clarity_of_communication,
        technical_level,
    }
}

fn builtin_personas() -> Vec<Persona> {
    vec![
        Persona::new(
            "vague-communicator",
            "Vague Communicator",
            traits(0.6, 0.4, 0.3, 0.5, 0.2, 0.3),
        )
        .with_description(
            "Asks unclear questions about stored memories, exercising the clarification policy",
        ),
        Persona::new(
            "clarification-cooperative",
            "Clarification Cooperative",
            traits(0.8, 0.5, 0.6, 0.7, 0.8, 0.4),
        )
        .with_description("Answers clarifying questions helpfully and in detail"),
        Persona::new(
            "clarification-resistant",
            "Clarification Resistant",
            traits(0.2, 0.3, 0.4, 0.3, 0.4, 0.2),
        )
        .with_description("Gets frustrated by clarification requests and withholds details"),
        Persona::new(
            "memory-heavy-user",
            "Memory Heavy User",
            traits(0.7, 0.6, 0.7, 0.6, 0.6, 0.5),
        )
        .with_description("Stores lots of information and recalls it with varying specificity"),
        Persona::new(
            "precise-questioner",
            "Precise Questioner",
            traits(0.5, 0.7, 0.5, 0.5, 0.9, 0.6),
        )
        .with_description("Asks very specific questions, exercising direct retrieval"),
        Persona::new(
            "extremely-vague",
            "Extremely Vague",
            traits(0.4, 0.2, 0.3, 0.4, 0.1, 0.1),
        )
        .with_description("Asks maximally ambiguous questions needing several clarification rounds"),
    ]
}

fn builtin_goals() -> Vec<Goal> {
    vec![
        Goal::new(
            "vague-memory-recall",
            "Ask vague questions about previously stored memories",
            "What was that thing I did with my friend?",
            Complexity::Moderate,
        )
        .with_expected_turns(4)
        .with_criterion("Assistant recognizes vague query and asks clarifying questions")
        .with_criterion("User provides clarification in response to assistant prompts")
        .with_criterion("Assistant uses clarification to search for specific memory")
        .with_criterion("User either gets their answer or understands why memory not found")
        .with_follow_up("It was a dinner, I think last week.")
        .with_follow_up("Somewhere with a sunset view, with someone from college.")
        .with_follow_up("What did we talk about?"),
        Goal::new(
            "specific-memory-recall",
            "Ask specific questions about stored memories",
            "When is my appointment with Dr. Johnson about my knee?",
            Complexity::Simple,
        )
        .with_expected_turns(2)
        .with_criterion("Assistant immediately searches for the specific memory")
        .with_criterion("Assistant provides the memory if found or explains if not found")
        .with_criterion("No unnecessary clarification requests for clear queries")
        .with_follow_up("What do I need to bring to it?"),
        Goal::new(
            "multi-clarification-memory",
            "Ask extremely vague questions requiring multiple rounds of clarification",
            "Remind me about the thing.",
            Complexity::Complex,
        )
        .with_expected_turns(6)
        .with_criterion("Assistant asks appropriate follow-up clarification questions")
        .with_criterion("Assistant maintains context through multiple clarification rounds")
        .with_criterion("User eventually gets specific enough for memory search")
        .with_criterion("Assistant successfully retrieves or explains absence of memory")
        .with_follow_up("You know, the thing for someone.")
        .with_follow_up("For family. It's coming up soon.")
        .with_follow_up("A birthday present, for my mom.")
        .with_follow_up("What did she say she wanted?"),
        Goal::new(
            "resist-clarification",
            "See how the assistant handles a user who resists clarifying",
            "Just tell me what I bought.",
            Complexity::Moderate,
        )
        .with_expected_turns(5)
        .with_criterion("Assistant persists in seeking necessary clarification")
        .with_criterion("Assistant explains why clarification is needed")
        .with_criterion("Assistant handles user frustration gracefully")
        .with_criterion("Assistant either gets clarification or explains inability to help")
        .with_follow_up("Why do you need to know that? Just look it up.")
        .with_follow_up("Fine. Groceries. Yesterday."),
        Goal::new(
            "memory-storage-test",
            "Share information to be stored, then recall it with vague queries",
            "Remember that I started reading The Seven Husbands of Evelyn Hugo and I'm on chapter 3.",
            Complexity::Moderate,
        )
        .with_expected_turns(6)
        .with_criterion("Assistant successfully stores shared information")
        .with_criterion("Assistant later asks for clarification when vague recall attempted")
        .with_criterion("Assistant retrieves stored information after clarification provided")
        .with_follow_up("What was I reading again?")
        .with_follow_up("The novel, the one I started recently.")
        .with_follow_up("Which chapter was I on?"),
    ]
}
