//! Specification input: variable declarations, the LTL property and the
//! optional pre-seeded history atoms, read from a YAML file.

use std::collections::HashMap;
use std::path::Path;

use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::formula::parser::parse_ltl;
use crate::formula::Formula;
use crate::theory::parser::parse_term;
use crate::theory::{Term, VarType};

/// Who controls a variable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarOwner {
    Environment,
    System,
}

/// A declared specification variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: VarType,
    pub owner: VarOwner,
}

impl VarDecl {
    pub fn new(name: impl Into<String>, ty: VarType, owner: VarOwner) -> Self {
        Self {
            name: name.into(),
            ty,
            owner,
        }
    }
}

/// A parsed specification file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specification {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub variables: Vec<VarDecl>,
    pub property: String,
    /// Theory atoms whose history-bridging facts are registered before the
    /// first synthesis call.
    #[serde(default)]
    pub fetch_atoms: Vec<String>,
}

impl Specification {
    pub fn from_yaml_str(src: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(src)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let src = fs::read_to_string(path)?;
        let mut spec = Self::from_yaml_str(&src)?;
        if spec.name.is_none() {
            spec.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        Ok(spec)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Name to type map used by the term parsers.
    pub fn var_types(&self) -> HashMap<String, VarType> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.ty))
            .collect()
    }

    pub fn parse_property(&self) -> Result<Formula> {
        parse_ltl(&self.property, &self.var_types())
    }

    pub fn parse_fetch_atoms(&self) -> Result<Vec<Term>> {
        let vars = self.var_types();
        self.fetch_atoms
            .iter()
            .map(|src| parse_term(src, &vars))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = "\
name: bound
variables:
  - { name: d, type: Int, owner: environment }
  - { name: a, type: Int, owner: environment }
  - { name: r, type: Int, owner: system }
property: \"G ([r <= d])\"
";

    #[test]
    fn reads_yaml_and_parses_the_property() {
        let spec = Specification::from_yaml_str(EXAMPLE).unwrap();
        assert_eq!(spec.display_name(), "bound");
        assert_eq!(spec.variables.len(), 3);
        assert_eq!(spec.variables[2].owner, VarOwner::System);
        let property = spec.parse_property().unwrap();
        assert!(matches!(property, Formula::Globally(_)));
        assert!(spec.fetch_atoms.is_empty());
    }

    #[test]
    fn fetch_atoms_parse_against_the_declarations() {
        let with_atoms = format!("{}fetch_atoms:\n  - \"d < a\"\n", EXAMPLE);
        let spec = Specification::from_yaml_str(&with_atoms).unwrap();
        let atoms = spec.parse_fetch_atoms().unwrap();
        assert_eq!(atoms.len(), 1);
    }
}
