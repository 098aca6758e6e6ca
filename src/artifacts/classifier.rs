//! Table-driven artifact classification.
//!
//! [`RULES`] is an ordered list of `(predicate, kind)` pairs evaluated against
//! the path string only; the first match wins and the table ends with a
//! catch-all, so classification is total and pure.

use super::ArtifactKind;

/// Path facts the rules look at.
#[derive(Debug, Clone, Copy)]
pub struct PathFacts<'a> {
    /// Directory part with `/` separators, always starting with `/`.
    pub dir: &'a str,
    pub file_name: &'a str,
}

impl<'a> PathFacts<'a> {
    fn has_suffix(&self, suffix: &str) -> bool {
        self.file_name.ends_with(suffix)
    }

    /// True when a directory segment starts with any of `prefixes`.
    fn under_any(&self, prefixes: &[&str]) -> bool {
        prefixes.iter().any(|p| self.dir.contains(&format!("/{p}")))
    }

    fn pickle_under(&self, module_dir: &str) -> bool {
        self.has_suffix(".pkl") && self.under_any(&[module_dir])
    }
}

/// One row of the classification table.
pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&PathFacts<'_>) -> bool,
    pub kind: ArtifactKind,
}

const SERVICE: &str = "exem_aiops_anls_service";
const LOG: &str = "exem_aiops_anls_log";
const EVENT_FCST: &str = "exem_aiops_event_fcst";
const LOAD_FCST: &str = "exem_aiops_load_fcst";
const FCST_MIXER: &str = "exem_aiops_fcst_tsmixer";
const INST: &str = "exem_aiops_anls_inst";
const FCST: &str = "exem_aiops_fcst";

/// Result file the service module publishes from its per-file pass.
pub const SERVICE_RESULT_FILE: &str = "train_result.pkl";

fn inst_or_fcst(f: &PathFacts<'_>) -> bool {
    f.pickle_under(INST) || f.pickle_under(FCST)
}

/// Ordered rule table. Order encodes precedence.
pub static RULES: &[Rule] = &[
    Rule {
        name: "excluded-path",
        matches: |f| {
            f.under_any(&["backup", "chat"]) || f.has_suffix(".lock") || f.has_suffix(".h5")
        },
        kind: ArtifactKind::Ignored,
    },
    Rule {
        name: "json-config",
        matches: |f| f.has_suffix(".json"),
        kind: ArtifactKind::ConfigDocument,
    },
    Rule {
        name: "onnx-graph",
        matches: |f| f.has_suffix(".onnx"),
        kind: ArtifactKind::TensorModel,
    },
    Rule {
        name: "service-result",
        matches: |f| f.pickle_under(SERVICE) && f.file_name == SERVICE_RESULT_FILE,
        kind: ArtifactKind::GenericBlob,
    },
    Rule {
        name: "service-other-pickle",
        matches: |f| f.pickle_under(SERVICE),
        kind: ArtifactKind::Ignored,
    },
    Rule {
        name: "log-legacy-baseline",
        matches: |f| f.pickle_under(LOG) && f.dir.contains("dbsln"),
        kind: ArtifactKind::Ignored,
    },
    Rule {
        name: "log-pickle",
        matches: |f| f.pickle_under(LOG),
        kind: ArtifactKind::CompressedBlob,
    },
    Rule {
        name: "event-scaler",
        matches: |f| f.pickle_under(EVENT_FCST) && f.under_any(&["mean_std", "scalers"]),
        kind: ArtifactKind::CompressedBlob,
    },
    Rule {
        name: "event-pickle",
        matches: |f| f.pickle_under(EVENT_FCST),
        kind: ArtifactKind::GenericBlob,
    },
    Rule {
        name: "load-forecast-pickle",
        matches: |f| f.pickle_under(LOAD_FCST),
        kind: ArtifactKind::CompressedBlob,
    },
    Rule {
        name: "forecast-mixer-pickle",
        matches: |f| f.pickle_under(FCST_MIXER),
        kind: ArtifactKind::CompressedBlob,
    },
    Rule {
        name: "baseline-composite",
        matches: |f| inst_or_fcst(f) && f.under_any(&["dbsln"]),
        kind: ArtifactKind::CompositeStatisticalModel,
    },
    Rule {
        name: "sequence-graph-mixer",
        matches: |f| inst_or_fcst(f) && f.under_any(&["seqattn", "seq2seq", "gdn", "tsmixer"]),
        kind: ArtifactKind::CompressedBlob,
    },
    Rule {
        name: "legacy-recurrent",
        matches: |f| inst_or_fcst(f) && f.under_any(&["gru", "lstm", "tadgan", "gam", "rae", "dnn"]),
        kind: ArtifactKind::Ignored,
    },
    Rule {
        name: "document-vector",
        matches: |f| f.has_suffix(".model"),
        kind: ArtifactKind::TextVectorModel,
    },
    Rule {
        name: "fallback",
        matches: |_| true,
        kind: ArtifactKind::Ignored,
    },
];

/// Classify a path string.
pub fn classify(path: &str) -> ArtifactKind {
    explain(path).0
}

/// Classify a path string and name the rule that decided it.
pub fn explain(path: &str) -> (ArtifactKind, &'static str) {
    let normalized = path.replace('\\', "/");
    let (dir, file_name) = match normalized.rfind('/') {
        Some(idx) => (&normalized[..idx], &normalized[idx + 1..]),
        None => ("", normalized.as_str()),
    };
    let dir = if dir.starts_with('/') {
        dir.to_string()
    } else {
        format!("/{dir}")
    };
    let facts = PathFacts {
        dir: &dir,
        file_name,
    };

    RULES
        .iter()
        .find(|rule| (rule.matches)(&facts))
        .map(|rule| (rule.kind, rule.name))
        .unwrap_or((ArtifactKind::Ignored, "fallback"))
}
