//! Versioned gauge registry, loaded once at startup.
//!
//! Thresholds only change through `reload`, which swaps the whole catalog
//! after it validates.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::catalog::{builtin_gauges, THRESHOLD_VERSION};
use super::{Axis, GaugeSpec, SourceKind};

/// On-disk catalog layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub version: String,
    pub gauges: Vec<GaugeSpec>,
}

#[derive(Debug, Clone)]
pub struct GaugeRegistry {
    version: String,
    specs: Vec<GaugeSpec>,
    index: HashMap<String, usize>,
}

impl GaugeRegistry {
    pub fn new(version: &str, specs: Vec<GaugeSpec>) -> Result<Self> {
        let index = specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let registry = Self {
            version: version.to_string(),
            specs,
            index,
        };
        registry.validate()?;
        Ok(registry)
    }

    pub fn builtin() -> Result<Self> {
        Self::new(THRESHOLD_VERSION, builtin_gauges())
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(raw).context("parse gauge catalog")?;
        Self::new(&file.version, file.gauges)
    }

    /// Catalog file when a path is given, built-in table otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("read gauge catalog {}", p.display()))?;
                Self::from_json(&raw)
            }
            None => Self::builtin(),
        }
    }

    /// Replace the catalog. On error the current catalog stays in place.
    pub fn reload(&mut self, path: Option<&Path>) -> Result<()> {
        let next = Self::load(path)?;
        *self = next;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.specs.is_empty() {
            bail!("gauge catalog is empty");
        }
        if self.index.len() != self.specs.len() {
            bail!("gauge catalog has duplicate ids");
        }
        for spec in &self.specs {
            if spec.thresholds.is_empty() {
                bail!("gauge {} declares no threshold bands", spec.id);
            }
            if let SourceKind::Derived(formula) = &spec.source {
                for dep in formula.dependencies() {
                    if dep == spec.id {
                        bail!("derived gauge {} depends on itself", spec.id);
                    }
                    if !self.index.contains_key(dep) {
                        return Err(anyhow!(
                            "derived gauge {} depends on unknown gauge {}",
                            spec.id,
                            dep
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn specs(&self) -> &[GaugeSpec] {
        &self.specs
    }

    pub fn get(&self, id: &str) -> Option<&GaugeSpec> {
        self.index.get(id).map(|&i| &self.specs[i])
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Axes with at least one gauge, in declaration order.
    pub fn axes(&self) -> Vec<Axis> {
        Axis::ALL
            .iter()
            .copied()
            .filter(|a| self.specs.iter().any(|s| s.axis == *a))
            .collect()
    }
}
