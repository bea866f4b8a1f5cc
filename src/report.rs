//! Purpose: Render the diagnostic capability report and ad-hoc query results.
//! Exports: `Report`, `FlagSet`, `DEMO_FEATURES`, `DEMO_MODULES`, text/JSON renderers.
//! Role: Shared formatting for the `machinery` CLI commands.
//! Invariants: Text report order is version, features, modules; groups separated by blank lines.
//! Invariants: Name order is preserved exactly as queried, repeats included, in text and JSON.
use serde_json::{Value, json};

use machinery::api::{Machinery, Origin, VersionInfo};

pub(crate) const DEMO_FEATURES: &[&str] = &["ascii", "debug", "unicode"];
pub(crate) const DEMO_MODULES: &[&str] = &["arm", "mips", "x86", "ir", "jit"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FlagKind {
    Feature,
    Module,
}

impl FlagKind {
    fn query_label(self) -> &'static str {
        match self {
            FlagKind::Feature => "has_feature",
            FlagKind::Module => "has_module",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct FlagSet {
    pub kind: FlagKind,
    pub flags: Vec<(String, bool)>,
}

impl FlagSet {
    pub(crate) fn query<S, N>(machinery: &Machinery<S>, kind: FlagKind, names: &[N]) -> Self
    where
        N: AsRef<str>,
    {
        let flags = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                let present = match kind {
                    FlagKind::Feature => machinery.has_feature(name),
                    FlagKind::Module => machinery.has_module(name),
                };
                (name.to_string(), present)
            })
            .collect();
        Self { kind, flags }
    }

    pub(crate) fn to_text(&self) -> String {
        let mut out = String::new();
        for (name, present) in &self.flags {
            out.push_str(&format!(
                "machinery.{}('{name}'): {present}\n",
                self.kind.query_label()
            ));
        }
        out
    }

    /// One `{name, present}` object per queried name.
    pub(crate) fn to_json(&self) -> Value {
        Value::Array(
            self.flags
                .iter()
                .map(|(name, present)| json!({ "name": name, "present": present }))
                .collect(),
        )
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Report {
    pub version: VersionInfo,
    pub origin: Origin,
    pub features: FlagSet,
    pub modules: FlagSet,
}

impl Report {
    pub(crate) fn collect<S>(machinery: &Machinery<S>) -> Self {
        Self {
            version: machinery.version().clone(),
            origin: machinery.origin().clone(),
            features: FlagSet::query(machinery, FlagKind::Feature, DEMO_FEATURES),
            modules: FlagSet::query(machinery, FlagKind::Module, DEMO_MODULES),
        }
    }

    pub(crate) fn to_text(&self) -> String {
        let mut out = version_text(&self.version);
        out.push('\n');
        out.push_str(&self.features.to_text());
        out.push('\n');
        out.push_str(&self.modules.to_text());
        out.push('\n');
        out
    }

    pub(crate) fn to_json(&self) -> Value {
        json!({
            "version": version_json(&self.version),
            "origin": serde_json::to_value(&self.origin).unwrap_or(Value::Null),
            "features": self.features.to_json(),
            "modules": self.modules.to_json(),
        })
    }
}

pub(crate) fn version_text(version: &VersionInfo) -> String {
    format!("machinery.version_string(): {}\n", version.string)
}

pub(crate) fn version_json(version: &VersionInfo) -> Value {
    serde_json::to_value(version).unwrap_or(Value::Null)
}
