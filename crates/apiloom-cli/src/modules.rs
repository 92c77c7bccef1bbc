//! A `ModuleLoader` for `.json` module files, standing in for the "host
//! module system" the core deliberately leaves out of scope — the same way
//! `pcb-zen` ships only a no-op `RemoteFetcher` for the capability it
//! doesn't implement itself.
//!
//! A module file is a JSON object:
//!
//! ```json
//! { "default": <export>, "named": { "key": <export> } }
//! ```
//!
//! An `<export>` is either a plain JSON value (a primitive export) or
//! `{ "__fn__": "add" }`, naming one of a small fixed set of builtin
//! callables. There is no general-purpose scripting here on purpose: this
//! loader exists so `apiloom describe`/`apiloom call` have something real to
//! walk, not to be a module system of its own.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use apiloom_core::error::BoxError;
use apiloom_core::{ExportValue, ModuleLoader, RawExports, UserFn};
use async_trait::async_trait;
use serde_json::Value;

struct BuiltinFn {
    name: String,
    op: Builtin,
}

#[derive(Clone, Copy)]
enum Builtin {
    Add,
    Subtract,
    Multiply,
    Divide,
    Concat,
    Echo,
    Uppercase,
    Lowercase,
}

fn number_arg(args: &[Value], index: usize) -> anyhow::Result<f64> {
    args.get(index)
        .and_then(Value::as_f64)
        .with_context(|| format!("argument {index} must be a number"))
}

fn string_arg(args: &[Value], index: usize) -> anyhow::Result<String> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .with_context(|| format!("argument {index} must be a string"))
}

impl Builtin {
    fn call(self, args: Vec<Value>) -> anyhow::Result<Value> {
        let value = match self {
            Builtin::Add => Value::from(number_arg(&args, 0)? + number_arg(&args, 1)?),
            Builtin::Subtract => Value::from(number_arg(&args, 0)? - number_arg(&args, 1)?),
            Builtin::Multiply => Value::from(number_arg(&args, 0)? * number_arg(&args, 1)?),
            Builtin::Divide => {
                let divisor = number_arg(&args, 1)?;
                if divisor == 0.0 {
                    bail!("division by zero");
                }
                Value::from(number_arg(&args, 0)? / divisor)
            }
            Builtin::Concat => {
                let mut out = String::new();
                for arg in &args {
                    out.push_str(&arg.as_str().map(str::to_string).unwrap_or_else(|| arg.to_string()));
                }
                Value::from(out)
            }
            Builtin::Echo => args.into_iter().next().unwrap_or(Value::Null),
            Builtin::Uppercase => Value::from(string_arg(&args, 0)?.to_uppercase()),
            Builtin::Lowercase => Value::from(string_arg(&args, 0)?.to_lowercase()),
        };
        Ok(value)
    }

    fn by_name(name: &str) -> anyhow::Result<Self> {
        Ok(match name {
            "add" => Builtin::Add,
            "subtract" => Builtin::Subtract,
            "multiply" => Builtin::Multiply,
            "divide" => Builtin::Divide,
            "concat" => Builtin::Concat,
            "echo" => Builtin::Echo,
            "uppercase" => Builtin::Uppercase,
            "lowercase" => Builtin::Lowercase,
            other => bail!("unknown builtin `{other}`"),
        })
    }
}

#[async_trait]
impl UserFn for BuiltinFn {
    async fn call(&self, args: Vec<Value>) -> std::result::Result<Value, BoxError> {
        self.op.call(args).map_err(|e| e.to_string().into())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn export_from_json(key: &str, value: Value) -> anyhow::Result<ExportValue> {
    if let Value::Object(obj) = &value {
        if let Some(Value::String(op_name)) = obj.get("__fn__") {
            let op = Builtin::by_name(op_name)?;
            return Ok(ExportValue::function(BuiltinFn {
                name: key.to_string(),
                op,
            }));
        }
    }
    if let Value::Object(obj) = value {
        let mut children = BTreeMap::new();
        for (k, v) in obj {
            children.insert(k.clone(), export_from_json(&k, v)?);
        }
        return Ok(ExportValue::object(children));
    }
    Ok(ExportValue::Primitive(value))
}

/// `.json`-file-backed [`ModuleLoader`]. Non-JSON files (e.g. a stray
/// `README.md` left in an api directory) are reported as loader errors —
/// callers scope `dir` to contain only module files.
pub struct JsonModuleLoader;

#[async_trait]
impl ModuleLoader for JsonModuleLoader {
    async fn load(&self, path: &Path) -> std::result::Result<RawExports, BoxError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("reading {}: {e}", path.display()))?;
        let parsed: Value = serde_json::from_str(&contents)
            .map_err(|e| format!("parsing {}: {e}", path.display()))?;

        let Value::Object(top) = parsed else {
            return Err(format!("{}: module must be a JSON object", path.display()).into());
        };

        let default = match top.get("default") {
            Some(Value::Null) | None => None,
            Some(v) => Some(export_from_json("default", v.clone()).map_err(|e| e.to_string())?),
        };

        let mut named = BTreeMap::new();
        if let Some(Value::Object(named_obj)) = top.get("named") {
            for (k, v) in named_obj {
                named.insert(
                    k.clone(),
                    export_from_json(k, v.clone()).map_err(|e| e.to_string())?,
                );
            }
        }

        Ok(RawExports {
            default,
            named,
            marked_as_callable_default: top
                .get("markAsCallableDefault")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_a_named_builtin_and_a_primitive_default_from_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let module_path = dir.path().join("math.json");
        std::fs::write(
            &module_path,
            r#"{
                "default": 42,
                "named": { "add": { "__fn__": "add" } }
            }"#,
        )
        .unwrap();

        let loader = JsonModuleLoader;
        let raw = loader.load(&module_path).await.unwrap();

        assert!(matches!(raw.default, Some(ExportValue::Primitive(Value::Number(_)))));
        let add = raw.named.get("add").unwrap();
        let ExportValue::Function(f) = add else {
            panic!("expected `add` to be a function export");
        };
        let result = f.call(vec![Value::from(2), Value::from(3)]).await.unwrap();
        assert_eq!(result, Value::from(5.0));
    }

    #[tokio::test]
    async fn a_non_json_file_is_a_loader_error() {
        let dir = tempfile::tempdir().unwrap();
        let module_path = dir.path().join("notes.json");
        std::fs::write(&module_path, "this is not json").unwrap();

        let loader = JsonModuleLoader;
        assert!(loader.load(&module_path).await.is_err());
    }
}
