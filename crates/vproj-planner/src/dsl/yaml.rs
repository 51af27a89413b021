//! YAML surface for projection lists.
//!
//! Example:
//! ```yaml
//! config:
//!   var_width_bytes_per_row: 32
//! project:
//!   - id                                   # bare column, keeps its name
//!   - { name: who, expr: name }            # rename
//!   - { name: initial, expr: "name[0]" }   # read path
//!   - name: total
//!     expr: { call: add, args: [price, { lit: 1 }] }
//!   - name: price_txt
//!     expr: { cast: price, to: Utf8 }
//! ```
//!
//! A `"*"` entry selects every input column unchanged.

use serde::{Deserialize, Serialize};

use vproj_core::config::ProjectConfig;
use vproj_core::schema::DataType;
use vproj_core::types::Scalar;

use crate::error::PlanError;
use crate::logical::{LogicalExpr, NamedExpr, ProjectionSpec, SchemaPath, WILDCARD};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectionDoc {
    #[serde(default)]
    config: Option<ConfigOverrides>,
    project: Vec<EntryDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum EntryDef {
    Short(String),
    Full {
        #[serde(default)]
        name: Option<String>,
        expr: ExprDef,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ExprDef {
    Path(String),
    Literal {
        lit: serde_yaml::Value,
        #[serde(default, rename = "type")]
        ty: Option<String>,
    },
    Call {
        call: String,
        #[serde(default)]
        args: Vec<ExprDef>,
    },
    Cast {
        cast: Box<ExprDef>,
        to: String,
    },
}

/// Optional `config:` block; unset keys keep the caller's values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub mem_cap_bytes: Option<usize>,
    pub var_width_bytes_per_row: Option<usize>,
    pub max_batch_rows: Option<usize>,
    pub enable_transfers: Option<bool>,
    pub compile_cache: Option<bool>,
}

impl ConfigOverrides {
    pub fn apply(&self, cfg: &mut ProjectConfig) {
        if let Some(v) = self.mem_cap_bytes {
            cfg.mem_cap_bytes = v;
        }
        if let Some(v) = self.var_width_bytes_per_row {
            cfg.var_width_bytes_per_row = v;
        }
        if let Some(v) = self.max_batch_rows {
            cfg.max_batch_rows = v;
        }
        if let Some(v) = self.enable_transfers {
            cfg.enable_transfers = v;
        }
        if let Some(v) = self.compile_cache {
            cfg.compile_cache = v;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct ParsedProjection {
    pub spec: ProjectionSpec,
    pub config: ConfigOverrides,
}

fn parse_dtype(s: &str) -> Result<DataType, PlanError> {
    s.parse::<DataType>()
        .map_err(|e| PlanError::Invalid(e.to_string()))
}

fn to_literal(value: &serde_yaml::Value) -> Result<Scalar, PlanError> {
    use serde_yaml::Value;
    match value {
        Value::Null => Ok(Scalar::Null),
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Scalar::I64(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Scalar::F64(f))
            } else {
                Err(PlanError::Invalid(format!("unsupported number literal {n}")))
            }
        }
        Value::String(s) => Ok(Scalar::Str(s.clone())),
        other => Err(PlanError::Invalid(format!(
            "unsupported literal {other:?}"
        ))),
    }
}

fn to_expr(def: &ExprDef) -> Result<LogicalExpr, PlanError> {
    Ok(match def {
        ExprDef::Path(p) => LogicalExpr::path(SchemaPath::parse(p)?),
        ExprDef::Literal { lit, ty } => {
            let value = LogicalExpr::lit(to_literal(lit)?);
            match ty {
                Some(t) => LogicalExpr::cast(value, parse_dtype(t)?),
                None => value,
            }
        }
        ExprDef::Call { call, args } => LogicalExpr::call(
            call.clone(),
            args.iter().map(to_expr).collect::<Result<_, _>>()?,
        ),
        ExprDef::Cast { cast, to } => LogicalExpr::cast(to_expr(cast)?, parse_dtype(to)?),
    })
}

fn to_entry(idx: usize, def: EntryDef) -> Result<NamedExpr, PlanError> {
    let (name, expr) = match def {
        EntryDef::Short(path) => (None, ExprDef::Path(path)),
        EntryDef::Full { name, expr } => (name, expr),
    };
    if let ExprDef::Path(p) = &expr {
        if p.trim() == WILDCARD {
            return match name.as_deref() {
                None | Some(WILDCARD) => Ok(NamedExpr::wildcard()),
                Some(other) => Err(PlanError::Invalid(format!(
                    "entry {idx}: '*' cannot be renamed to '{other}'"
                ))),
            };
        }
    }
    let logical = to_expr(&expr)?;
    let name = match (name, &logical) {
        (Some(n), _) => n,
        (None, LogicalExpr::Column(path)) => path.root.clone(),
        (None, _) => {
            return Err(PlanError::Invalid(format!(
                "entry {idx}: computed expressions need a 'name'"
            )))
        }
    };
    if name.trim().is_empty() {
        return Err(PlanError::Invalid(format!("entry {idx}: empty output name")));
    }
    Ok(NamedExpr::new(name, logical))
}

/// Parse a YAML projection document.
pub fn parse_yaml_projection(yaml_src: &str) -> Result<ParsedProjection, PlanError> {
    let doc: ProjectionDoc = serde_yaml::from_str(yaml_src)?;
    if doc.project.is_empty() {
        return Err(PlanError::Invalid("empty projection".into()));
    }
    let exprs = doc
        .project
        .into_iter()
        .enumerate()
        .map(|(idx, def)| to_entry(idx, def))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParsedProjection {
        spec: ProjectionSpec::new(exprs),
        config: doc.config.unwrap_or_default(),
    })
}
