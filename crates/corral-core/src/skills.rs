//! Two-phase skill catalogue.
//!
//! Phase 1: every advertised skill's name and description is injected
//! into the system prompt so the model knows what exists. Phase 2: the
//! full instruction body of each *activated* skill is additionally
//! injected, in activation order. Hidden skills are omitted from the
//! catalogue but still injectable once active.
//!
//! Skills can be registered programmatically or loaded from a directory
//! of `<skill>/SKILL.md` files with YAML-style frontmatter:
//!
//! ```text
//! ---
//! name: git-commit
//! description: Craft a commit from the staged changes
//! ---
//!
//! [instructions...]
//! ```

use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::debug;

/// A modular capability description injected into the system prompt.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub instructions: String,
    /// Hidden skills are left out of the phase-1 catalogue.
    pub hidden: bool,
}

impl Skill {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instructions: instructions.into(),
            hidden: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Parse a SKILL.md body (frontmatter + instructions).
    pub fn parse(content: &str) -> Result<Self> {
        let rest = content
            .strip_prefix("---")
            .ok_or_else(|| anyhow!("SKILL.md must start with frontmatter"))?;
        let (frontmatter, body) = rest
            .split_once("---")
            .ok_or_else(|| anyhow!("unterminated frontmatter"))?;

        let mut name = None;
        let mut description = None;
        for line in frontmatter.lines() {
            if let Some((key, value)) = line.split_once(':') {
                match key.trim() {
                    "name" => name = Some(value.trim().to_string()),
                    "description" => description = Some(value.trim().to_string()),
                    _ => {}
                }
            }
        }

        Ok(Self {
            name: name.ok_or_else(|| anyhow!("frontmatter missing 'name'"))?,
            description: description.ok_or_else(|| anyhow!("frontmatter missing 'description'"))?,
            instructions: body.trim().to_string(),
            hidden: false,
        })
    }
}

/// Registry with per-skill activation state.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: Vec<Skill>,
    /// Names of active skills, in activation order.
    active: Vec<String>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, skill: Skill) {
        debug!(skill = %skill.name, "registered skill");
        self.skills.push(skill);
    }

    /// Load every `<dir>/<skill>/SKILL.md` found under `dir`. Unparseable
    /// entries are skipped with a debug log.
    pub fn load_dir(&mut self, dir: &Path) -> usize {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return 0;
        };

        let mut loaded = 0;
        let mut skills = Vec::new();
        for entry in entries.flatten() {
            let skill_file = entry.path().join("SKILL.md");
            let Ok(content) = std::fs::read_to_string(&skill_file) else {
                continue;
            };
            match Skill::parse(&content) {
                Ok(skill) => skills.push(skill),
                Err(e) => debug!(path = %skill_file.display(), "skipping skill: {}", e),
            }
        }

        skills.sort_by(|a, b| a.name.cmp(&b.name));
        for skill in skills {
            self.register(skill);
            loaded += 1;
        }
        loaded
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.name == name)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.iter().any(|n| n == name)
    }

    /// Activate a skill. Re-activating moves it to the end of the
    /// injection order.
    pub fn activate(&mut self, name: &str) -> Result<()> {
        if self.get(name).is_none() {
            return Err(anyhow!("unknown skill '{}'", name));
        }
        self.active.retain(|n| n != name);
        self.active.push(name.to_string());
        Ok(())
    }

    pub fn deactivate(&mut self, name: &str) {
        self.active.retain(|n| n != name);
    }

    /// Phase 1: catalogue of advertised skills.
    pub fn catalog_prompt(&self) -> Option<String> {
        let advertised: Vec<&Skill> = self.skills.iter().filter(|s| !s.hidden).collect();
        if advertised.is_empty() {
            return None;
        }

        let mut prompt = String::from(
            "## Available skills\n\nActivate a skill to receive its full instructions.\n\n",
        );
        for skill in advertised {
            prompt.push_str(&format!("- {}: {}\n", skill.name, skill.description));
        }
        Some(prompt)
    }

    /// Phase 2: full instructions of active skills, in activation order.
    pub fn active_prompt(&self) -> Option<String> {
        if self.active.is_empty() {
            return None;
        }

        let mut prompt = String::new();
        for name in &self.active {
            let Some(skill) = self.get(name) else {
                continue;
            };
            prompt.push_str(&format!("## Skill: {}\n\n{}\n\n", skill.name, skill.instructions));
        }
        if prompt.is_empty() {
            None
        } else {
            Some(prompt.trim_end().to_string())
        }
    }

    /// Full system-prompt suffix (phase 1 + phase 2).
    pub fn render(&self) -> Option<String> {
        let mut sections = Vec::new();
        if let Some(catalog) = self.catalog_prompt() {
            sections.push(catalog);
        }
        if let Some(active) = self.active_prompt() {
            sections.push(active);
        }
        if sections.is_empty() {
            None
        } else {
            Some(sections.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(skills: Vec<Skill>) -> SkillRegistry {
        let mut registry = SkillRegistry::new();
        for skill in skills {
            registry.register(skill);
        }
        registry
    }

    #[test]
    fn catalog_lists_advertised_skills_only() {
        let registry = registry_with(vec![
            Skill::new("alpha", "first skill", "do A"),
            Skill::new("secret", "internal", "do S").hidden(),
        ]);

        let catalog = registry.catalog_prompt().unwrap();
        assert!(catalog.contains("alpha: first skill"));
        assert!(!catalog.contains("secret"));
    }

    #[test]
    fn instructions_injected_only_when_active() {
        let mut registry = registry_with(vec![Skill::new("alpha", "first", "ALPHA BODY")]);

        let rendered = registry.render().unwrap();
        assert!(!rendered.contains("ALPHA BODY"));

        registry.activate("alpha").unwrap();
        let rendered = registry.render().unwrap();
        assert!(rendered.contains("ALPHA BODY"));

        registry.deactivate("alpha");
        assert!(!registry.render().unwrap().contains("ALPHA BODY"));
    }

    #[test]
    fn active_prompt_follows_activation_order() {
        let mut registry = registry_with(vec![
            Skill::new("alpha", "a", "A"),
            Skill::new("beta", "b", "B"),
        ]);
        registry.activate("beta").unwrap();
        registry.activate("alpha").unwrap();

        let prompt = registry.active_prompt().unwrap();
        let beta_pos = prompt.find("Skill: beta").unwrap();
        let alpha_pos = prompt.find("Skill: alpha").unwrap();
        assert!(beta_pos < alpha_pos);

        // Re-activation moves to the end.
        registry.activate("beta").unwrap();
        let prompt = registry.active_prompt().unwrap();
        assert!(prompt.find("Skill: alpha").unwrap() < prompt.find("Skill: beta").unwrap());
    }

    #[test]
    fn activate_unknown_skill_fails() {
        let mut registry = SkillRegistry::new();
        assert!(registry.activate("nope").is_err());
    }

    #[test]
    fn parse_skill_md() {
        let content = "---\nname: git-commit\ndescription: Craft a commit\n---\n\nDo the thing.\n";
        let skill = Skill::parse(content).unwrap();
        assert_eq!(skill.name, "git-commit");
        assert_eq!(skill.description, "Craft a commit");
        assert_eq!(skill.instructions, "Do the thing.");
    }

    #[test]
    fn parse_rejects_missing_frontmatter() {
        assert!(Skill::parse("no frontmatter here").is_err());
        assert!(Skill::parse("---\nname: x\n---\nbody").is_err()); // no description
    }

    #[test]
    fn load_dir_reads_skill_files() {
        let dir = tempfile::tempdir().unwrap();
        let skill_dir = dir.path().join("greeting");
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(
            skill_dir.join("SKILL.md"),
            "---\nname: greeting\ndescription: Say hello\n---\nWave politely.",
        )
        .unwrap();

        let mut registry = SkillRegistry::new();
        assert_eq!(registry.load_dir(dir.path()), 1);
        assert!(registry.get("greeting").is_some());
    }
}
