//! Built-in scalar functions and casts.
//!
//! Functions are resolved by name (case-insensitive) at materialization time
//! and invoked per row by the compiled projector. Arguments reaching `eval`
//! have already been cast to the types `resolve` asked for.

use std::cmp::Ordering;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use thiserror::Error;

use vproj_core::schema::DataType;
use vproj_core::types::Scalar;

/// Runtime evaluation failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("cannot cast {value} to {to}")]
    Cast { value: String, to: DataType },

    #[error("{func}: {reason}")]
    Function { func: String, reason: String },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("writing output column '{column}': {reason}")]
    Write { column: String, reason: String },

    #[error("no input value for field {field} at row {row}")]
    MissingInput { field: usize, row: usize },
}

impl EvalError {
    fn func(func: &str, reason: impl Into<String>) -> Self {
        EvalError::Function {
            func: func.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == *k,
            Arity::AtLeast(k) => n >= *k,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exact(k) => write!(f, "{k}"),
            Arity::AtLeast(k) => write!(f, "at least {k}"),
        }
    }
}

/// Resolved call shape: the types arguments must be cast to, and the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub args: Vec<DataType>,
    pub ret: DataType,
}

pub type ResolveFn = fn(&[DataType]) -> Result<Signature, String>;
pub type EvalFn = fn(&[Scalar]) -> Result<Scalar, EvalError>;

#[derive(Debug, Clone)]
pub struct ScalarFunction {
    pub name: &'static str,
    pub arity: Arity,
    /// Null in, null out. Checked before `eval` is called.
    pub strict: bool,
    pub resolve: ResolveFn,
    pub eval: EvalFn,
}

impl ScalarFunction {
    pub fn invoke(&self, args: &[Scalar]) -> Result<Scalar, EvalError> {
        if self.strict && args.iter().any(Scalar::is_null) {
            return Ok(Scalar::Null);
        }
        (self.eval)(args)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, ScalarFunction>,
}

static BUILTINS: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::with_builtins);

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared registry holding every built-in function.
    pub fn builtin() -> &'static FunctionRegistry {
        &BUILTINS
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        for (name, eval) in [
            ("add", add as EvalFn),
            ("subtract", subtract),
            ("multiply", multiply),
            ("divide", divide),
            ("modulo", modulo),
        ] {
            reg.register(ScalarFunction {
                name,
                arity: Arity::Exact(2),
                strict: true,
                resolve: resolve_arithmetic,
                eval,
            });
        }
        for (name, eval) in [("negate", negate as EvalFn), ("abs", abs)] {
            reg.register(ScalarFunction {
                name,
                arity: Arity::Exact(1),
                strict: true,
                resolve: resolve_arithmetic,
                eval,
            });
        }
        for (name, eval) in [
            ("equal", equal as EvalFn),
            ("not_equal", not_equal),
            ("less_than", less_than),
            ("greater_than", greater_than),
        ] {
            reg.register(ScalarFunction {
                name,
                arity: Arity::Exact(2),
                strict: true,
                resolve: resolve_comparison,
                eval,
            });
        }
        // three-valued logic, so not strict
        for (name, eval) in [("and", and as EvalFn), ("or", or)] {
            reg.register(ScalarFunction {
                name,
                arity: Arity::Exact(2),
                strict: false,
                resolve: resolve_boolean,
                eval,
            });
        }
        reg.register(ScalarFunction {
            name: "not",
            arity: Arity::Exact(1),
            strict: true,
            resolve: resolve_boolean,
            eval: not,
        });
        reg.register(ScalarFunction {
            name: "concat",
            arity: Arity::AtLeast(1),
            strict: true,
            resolve: resolve_all_utf8,
            eval: concat,
        });
        for (name, eval) in [("upper", upper as EvalFn), ("lower", lower)] {
            reg.register(ScalarFunction {
                name,
                arity: Arity::Exact(1),
                strict: true,
                resolve: resolve_all_utf8,
                eval,
            });
        }
        reg.register(ScalarFunction {
            name: "length",
            arity: Arity::Exact(1),
            strict: true,
            resolve: resolve_length,
            eval: length,
        });
        reg.register(ScalarFunction {
            name: "coalesce",
            arity: Arity::AtLeast(1),
            strict: false,
            resolve: resolve_common,
            eval: coalesce,
        });
        reg.register(ScalarFunction {
            name: "is_null",
            arity: Arity::Exact(1),
            strict: false,
            resolve: |args| {
                Ok(Signature {
                    args: args.to_vec(),
                    ret: DataType::Boolean,
                })
            },
            eval: |args| Ok(Scalar::Bool(args[0].is_null())),
        });
        reg
    }

    pub fn register(&mut self, f: ScalarFunction) {
        self.functions.insert(f.name.to_ascii_lowercase(), f);
    }

    pub fn get(&self, name: &str) -> Option<&ScalarFunction> {
        self.functions.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

// ---------- type resolution ----------

/// Widest numeric type among `types`; `None` if any is not numeric.
pub fn promote_numeric(types: &[DataType]) -> Option<DataType> {
    if types.is_empty() || !types.iter().all(DataType::is_numeric) {
        return None;
    }
    let has = |dt: DataType| types.contains(&dt);
    Some(if has(DataType::Float64) {
        DataType::Float64
    } else if has(DataType::Float32) {
        if has(DataType::Int64) {
            DataType::Float64
        } else {
            DataType::Float32
        }
    } else if has(DataType::Int64) {
        DataType::Int64
    } else {
        DataType::Int32
    })
}

fn resolve_arithmetic(args: &[DataType]) -> Result<Signature, String> {
    let ret = promote_numeric(args)
        .ok_or_else(|| format!("expects numeric arguments, got {}", type_list(args)))?;
    Ok(Signature {
        args: vec![ret; args.len()],
        ret,
    })
}

fn resolve_comparison(args: &[DataType]) -> Result<Signature, String> {
    let common = common_type(args)
        .ok_or_else(|| format!("cannot compare {}", type_list(args)))?;
    Ok(Signature {
        args: vec![common; args.len()],
        ret: DataType::Boolean,
    })
}

fn resolve_boolean(args: &[DataType]) -> Result<Signature, String> {
    if args.iter().all(|t| *t == DataType::Boolean) {
        Ok(Signature {
            args: args.to_vec(),
            ret: DataType::Boolean,
        })
    } else {
        Err(format!("expects Boolean arguments, got {}", type_list(args)))
    }
}

fn resolve_all_utf8(args: &[DataType]) -> Result<Signature, String> {
    if args.iter().all(|t| *t == DataType::Utf8) {
        Ok(Signature {
            args: args.to_vec(),
            ret: DataType::Utf8,
        })
    } else {
        Err(format!("expects Utf8 arguments, got {}", type_list(args)))
    }
}

fn resolve_length(args: &[DataType]) -> Result<Signature, String> {
    match args {
        [DataType::Utf8] | [DataType::Binary] => Ok(Signature {
            args: args.to_vec(),
            ret: DataType::Int32,
        }),
        _ => Err(format!("expects Utf8 or Binary, got {}", type_list(args))),
    }
}

fn resolve_common(args: &[DataType]) -> Result<Signature, String> {
    let common = common_type(args)
        .ok_or_else(|| format!("arguments have no common type: {}", type_list(args)))?;
    Ok(Signature {
        args: vec![common; args.len()],
        ret: common,
    })
}

/// Identical types, or numerics that promote.
fn common_type(args: &[DataType]) -> Option<DataType> {
    let first = *args.first()?;
    if args.iter().all(|t| *t == first) {
        return Some(first);
    }
    promote_numeric(args)
}

fn type_list(args: &[DataType]) -> String {
    let names: Vec<String> = args.iter().map(ToString::to_string).collect();
    format!("({})", names.join(", "))
}

// ---------- evaluation ----------

enum IntOutcome {
    Value(i64),
    Null,
    Overflow,
}

fn numeric_binary(
    func: &str,
    args: &[Scalar],
    int_op: fn(i64, i64) -> IntOutcome,
    float_op: fn(f64, f64) -> f64,
) -> Result<Scalar, EvalError> {
    let finish = |out: IntOutcome, narrow: bool| match out {
        IntOutcome::Value(v) if narrow => i32::try_from(v)
            .map(Scalar::I32)
            .map_err(|_| EvalError::func(func, "integer overflow")),
        IntOutcome::Value(v) => Ok(Scalar::I64(v)),
        IntOutcome::Null => Ok(Scalar::Null),
        IntOutcome::Overflow => Err(EvalError::func(func, "integer overflow")),
    };
    match (&args[0], &args[1]) {
        (Scalar::I32(a), Scalar::I32(b)) => finish(int_op(i64::from(*a), i64::from(*b)), true),
        (Scalar::I64(a), Scalar::I64(b)) => finish(int_op(*a, *b), false),
        (Scalar::F32(a), Scalar::F32(b)) => {
            Ok(Scalar::F32(float_op(f64::from(*a), f64::from(*b)) as f32))
        }
        (Scalar::F64(a), Scalar::F64(b)) => Ok(Scalar::F64(float_op(*a, *b))),
        (a, b) => Err(EvalError::func(
            func,
            format!("mismatched operands {a:?} and {b:?}"),
        )),
    }
}

fn checked(v: Option<i64>) -> IntOutcome {
    v.map(IntOutcome::Value).unwrap_or(IntOutcome::Overflow)
}

fn add(args: &[Scalar]) -> Result<Scalar, EvalError> {
    numeric_binary("add", args, |a, b| checked(a.checked_add(b)), |a, b| a + b)
}

fn subtract(args: &[Scalar]) -> Result<Scalar, EvalError> {
    numeric_binary("subtract", args, |a, b| checked(a.checked_sub(b)), |a, b| a - b)
}

fn multiply(args: &[Scalar]) -> Result<Scalar, EvalError> {
    numeric_binary("multiply", args, |a, b| checked(a.checked_mul(b)), |a, b| a * b)
}

fn divide(args: &[Scalar]) -> Result<Scalar, EvalError> {
    numeric_binary(
        "divide",
        args,
        |a, b| {
            if b == 0 {
                IntOutcome::Null
            } else {
                checked(a.checked_div(b))
            }
        },
        |a, b| a / b,
    )
}

fn modulo(args: &[Scalar]) -> Result<Scalar, EvalError> {
    numeric_binary(
        "modulo",
        args,
        |a, b| {
            if b == 0 {
                IntOutcome::Null
            } else {
                checked(a.checked_rem(b))
            }
        },
        |a, b| a % b,
    )
}

fn negate(args: &[Scalar]) -> Result<Scalar, EvalError> {
    match &args[0] {
        Scalar::I32(v) => v
            .checked_neg()
            .map(Scalar::I32)
            .ok_or_else(|| EvalError::func("negate", "integer overflow")),
        Scalar::I64(v) => v
            .checked_neg()
            .map(Scalar::I64)
            .ok_or_else(|| EvalError::func("negate", "integer overflow")),
        Scalar::F32(v) => Ok(Scalar::F32(-v)),
        Scalar::F64(v) => Ok(Scalar::F64(-v)),
        other => Err(EvalError::func("negate", format!("non-numeric {other:?}"))),
    }
}

fn abs(args: &[Scalar]) -> Result<Scalar, EvalError> {
    match &args[0] {
        Scalar::I32(v) => v
            .checked_abs()
            .map(Scalar::I32)
            .ok_or_else(|| EvalError::func("abs", "integer overflow")),
        Scalar::I64(v) => v
            .checked_abs()
            .map(Scalar::I64)
            .ok_or_else(|| EvalError::func("abs", "integer overflow")),
        Scalar::F32(v) => Ok(Scalar::F32(v.abs())),
        Scalar::F64(v) => Ok(Scalar::F64(v.abs())),
        other => Err(EvalError::func("abs", format!("non-numeric {other:?}"))),
    }
}

fn compare(func: &str, a: &Scalar, b: &Scalar) -> Result<Option<Ordering>, EvalError> {
    use Scalar::*;
    Ok(match (a, b) {
        (Bool(x), Bool(y)) => Some(x.cmp(y)),
        (I32(x), I32(y)) => Some(x.cmp(y)),
        (I64(x), I64(y)) => Some(x.cmp(y)),
        (F32(x), F32(y)) => x.partial_cmp(y),
        (F64(x), F64(y)) => x.partial_cmp(y),
        (Str(x), Str(y)) => Some(x.cmp(y)),
        (Bin(x), Bin(y)) => Some(x.cmp(y)),
        _ => {
            return Err(EvalError::func(
                func,
                format!("cannot compare {a:?} with {b:?}"),
            ))
        }
    })
}

fn comparison(
    func: &str,
    args: &[Scalar],
    test: fn(Ordering) -> bool,
) -> Result<Scalar, EvalError> {
    // NaN compares false to everything.
    Ok(match compare(func, &args[0], &args[1])? {
        Some(ord) => Scalar::Bool(test(ord)),
        None => Scalar::Bool(false),
    })
}

fn equal(args: &[Scalar]) -> Result<Scalar, EvalError> {
    comparison("equal", args, |o| o == Ordering::Equal)
}

fn not_equal(args: &[Scalar]) -> Result<Scalar, EvalError> {
    comparison("not_equal", args, |o| o != Ordering::Equal)
}

fn less_than(args: &[Scalar]) -> Result<Scalar, EvalError> {
    comparison("less_than", args, |o| o == Ordering::Less)
}

fn greater_than(args: &[Scalar]) -> Result<Scalar, EvalError> {
    comparison("greater_than", args, |o| o == Ordering::Greater)
}

fn as_bool(func: &str, v: &Scalar) -> Result<Option<bool>, EvalError> {
    match v {
        Scalar::Null => Ok(None),
        Scalar::Bool(b) => Ok(Some(*b)),
        other => Err(EvalError::func(func, format!("non-boolean {other:?}"))),
    }
}

fn and(args: &[Scalar]) -> Result<Scalar, EvalError> {
    Ok(
        match (as_bool("and", &args[0])?, as_bool("and", &args[1])?) {
            (Some(false), _) | (_, Some(false)) => Scalar::Bool(false),
            (Some(true), Some(true)) => Scalar::Bool(true),
            _ => Scalar::Null,
        },
    )
}

fn or(args: &[Scalar]) -> Result<Scalar, EvalError> {
    Ok(match (as_bool("or", &args[0])?, as_bool("or", &args[1])?) {
        (Some(true), _) | (_, Some(true)) => Scalar::Bool(true),
        (Some(false), Some(false)) => Scalar::Bool(false),
        _ => Scalar::Null,
    })
}

fn not(args: &[Scalar]) -> Result<Scalar, EvalError> {
    Ok(match as_bool("not", &args[0])? {
        Some(b) => Scalar::Bool(!b),
        None => Scalar::Null,
    })
}

fn as_str<'a>(func: &str, v: &'a Scalar) -> Result<&'a str, EvalError> {
    match v {
        Scalar::Str(s) => Ok(s),
        other => Err(EvalError::func(func, format!("non-string {other:?}"))),
    }
}

fn concat(args: &[Scalar]) -> Result<Scalar, EvalError> {
    let mut out = String::new();
    for a in args {
        out.push_str(as_str("concat", a)?);
    }
    Ok(Scalar::Str(out))
}

fn upper(args: &[Scalar]) -> Result<Scalar, EvalError> {
    Ok(Scalar::Str(as_str("upper", &args[0])?.to_uppercase()))
}

fn lower(args: &[Scalar]) -> Result<Scalar, EvalError> {
    Ok(Scalar::Str(as_str("lower", &args[0])?.to_lowercase()))
}

fn length(args: &[Scalar]) -> Result<Scalar, EvalError> {
    let n = match &args[0] {
        Scalar::Str(s) => s.chars().count(),
        Scalar::Bin(b) => b.len(),
        other => return Err(EvalError::func("length", format!("unsupported {other:?}"))),
    };
    i32::try_from(n)
        .map(Scalar::I32)
        .map_err(|_| EvalError::func("length", "length exceeds Int32"))
}

fn coalesce(args: &[Scalar]) -> Result<Scalar, EvalError> {
    Ok(args
        .iter()
        .find(|a| !a.is_null())
        .cloned()
        .unwrap_or(Scalar::Null))
}

// ---------- casts ----------

/// Whether `cast_scalar` supports converting `from` into `to`.
pub fn can_cast(from: DataType, to: DataType) -> bool {
    use DataType::*;
    from == to
        || (from.is_numeric() && to.is_numeric())
        || (from.is_numeric() && to == Utf8)
        || (from == Utf8 && to.is_numeric())
        || matches!((from, to), (Boolean, Utf8) | (Utf8, Boolean))
}

/// Convert a value to `to`. Nulls stay null; lossy or unparsable
/// conversions fail.
pub fn cast_scalar(value: &Scalar, to: DataType) -> Result<Scalar, EvalError> {
    use Scalar::*;
    if value.is_null() || value.data_type() == Some(to) {
        return Ok(value.clone());
    }
    let fail = || EvalError::Cast {
        value: format!("{value:?}"),
        to,
    };
    let out = match (value, to) {
        (I32(v), DataType::Int64) => I64(i64::from(*v)),
        (I32(v), DataType::Float32) => F32(*v as f32),
        (I32(v), DataType::Float64) => F64(f64::from(*v)),
        (I64(v), DataType::Int32) => I32(i32::try_from(*v).map_err(|_| fail())?),
        (I64(v), DataType::Float32) => F32(*v as f32),
        (I64(v), DataType::Float64) => F64(*v as f64),
        (F32(v), DataType::Float64) => F64(f64::from(*v)),
        (F64(v), DataType::Float32) => F32(*v as f32),
        (F32(_) | F64(_), DataType::Int32 | DataType::Int64) => {
            let f = match value {
                F32(v) => f64::from(*v),
                F64(v) => *v,
                _ => return Err(fail()),
            };
            let t = f.trunc();
            if !t.is_finite() {
                return Err(fail());
            }
            if to == DataType::Int32 {
                if t < f64::from(i32::MIN) || t > f64::from(i32::MAX) {
                    return Err(fail());
                }
                I32(t as i32)
            } else {
                if t < i64::MIN as f64 || t >= i64::MAX as f64 {
                    return Err(fail());
                }
                I64(t as i64)
            }
        }
        (I32(v), DataType::Utf8) => Str(v.to_string()),
        (I64(v), DataType::Utf8) => Str(v.to_string()),
        (F32(v), DataType::Utf8) => Str(v.to_string()),
        (F64(v), DataType::Utf8) => Str(v.to_string()),
        (Bool(b), DataType::Utf8) => Str(b.to_string()),
        (Str(s), DataType::Int32) => I32(s.trim().parse().map_err(|_| fail())?),
        (Str(s), DataType::Int64) => I64(s.trim().parse().map_err(|_| fail())?),
        (Str(s), DataType::Float32) => F32(s.trim().parse().map_err(|_| fail())?),
        (Str(s), DataType::Float64) => F64(s.trim().parse().map_err(|_| fail())?),
        (Str(s), DataType::Boolean) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Bool(true),
            "false" => Bool(false),
            _ => return Err(fail()),
        },
        _ => return Err(fail()),
    };
    Ok(out)
}
