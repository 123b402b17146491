//! The host-function registry.
//!
//! A process-wide, read-only map from fully-qualified name to a uniform
//! `fn(ctx, [value]) -> value` plus a static parameter descriptor. The
//! evaluator coerces caller arguments to the declared parameter types
//! before invocation; `Any` parameters skip coercion.

use std::collections::HashMap;

use mapp_core::value::values_equal;
use mapp_core::{Ctx, MappError, Value, ValueType};

pub struct HostParam {
    pub name: &'static str,
    pub ty: ValueType,
}

pub type HostCall = Box<dyn Fn(&Ctx, &[Value]) -> Result<Value, MappError> + Send + Sync>;

pub struct HostFn {
    pub name: String,
    pub params: Vec<HostParam>,
    pub deterministic: bool,
    pub call: HostCall,
}

#[derive(Default)]
pub struct HostRegistry {
    fns: HashMap<String, HostFn>,
}

/// Internal failure inside a host body; the registry attaches the
/// function name on the way out.
pub fn host_fail(cause: impl Into<String>) -> MappError {
    MappError::HostError { name: String::new(), cause: cause.into() }
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        params: Vec<HostParam>,
        deterministic: bool,
        call: impl Fn(&Ctx, &[Value]) -> Result<Value, MappError> + Send + Sync + 'static,
    ) {
        self.fns.insert(
            name.to_string(),
            HostFn { name: name.to_string(), params, deterministic, call: Box::new(call) },
        );
    }

    pub fn get(&self, name: &str) -> Option<&HostFn> {
        self.fns.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fns.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Invoke by name with already-evaluated named arguments. Arguments
    /// are matched to the descriptor by name and coerced to the declared
    /// parameter types.
    pub fn invoke(
        &self,
        ctx: &Ctx,
        name: &str,
        args: &[(String, Value)],
    ) -> Result<Value, MappError> {
        let host = self
            .fns
            .get(name)
            .ok_or_else(|| MappError::UnknownOp(name.to_string()))?;

        let mut positional = Vec::with_capacity(host.params.len());
        for param in &host.params {
            let supplied = args
                .iter()
                .find(|(arg_name, _)| arg_name == param.name)
                .map(|(_, value)| value)
                .ok_or_else(|| {
                    MappError::TypeError(format!("{name} is missing argument {}", param.name))
                })?;
            let coerced = match &param.ty {
                ValueType::Any => supplied.clone(),
                ty => supplied.coerce(ty).map_err(|e| {
                    MappError::TypeError(format!("{name} argument {}: {e}", param.name))
                })?,
            };
            positional.push(coerced);
        }

        (host.call)(ctx, &positional).map_err(|err| match err {
            MappError::HostError { name: empty, cause } if empty.is_empty() => {
                MappError::HostError { name: name.to_string(), cause }
            }
            other => other,
        })
    }

    /// The closed standard set: casts, arithmetic, comparison, logic,
    /// list and string helpers, clock and randomness.
    pub fn standard() -> Self {
        let mut reg = Self::new();

        reg.register("bool", vec![any("value")], true, |_, args| {
            Ok(Value::Bool(match arg(args, 0)? {
                Value::Str(s) => Value::coerce_text(s, &ValueType::Bool, false)
                    .map(|v| v.truthy())
                    .unwrap_or(false),
                other => other.truthy(),
            }))
        });
        reg.register("int", vec![any("value")], true, |_, args| match arg(args, 0)? {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) => Ok(Value::Int(*f as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Str(s) => Value::coerce_text(s, &ValueType::Int, false),
            other => Err(MappError::TypeError(format!("cannot cast {} to int", other.type_name()))),
        });
        reg.register("float", vec![any("value")], true, |_, args| match arg(args, 0)? {
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Str(s) => Value::coerce_text(s, &ValueType::Float, false),
            other => {
                Err(MappError::TypeError(format!("cannot cast {} to float", other.type_name())))
            }
        });
        reg.register("str", vec![any("value")], true, |_, args| {
            Ok(Value::Str(arg(args, 0)?.display()))
        });

        reg.register("math.add", vec![any("a"), any("b")], true, |_, args| {
            arith(args, "add", |a, b| a.checked_add(b), |a, b| a + b)
        });
        reg.register("math.sub", vec![any("a"), any("b")], true, |_, args| {
            arith(args, "sub", |a, b| a.checked_sub(b), |a, b| a - b)
        });
        reg.register("math.mul", vec![any("a"), any("b")], true, |_, args| {
            arith(args, "mul", |a, b| a.checked_mul(b), |a, b| a * b)
        });
        reg.register("math.div", vec![any("a"), any("b")], true, |_, args| {
            match numeric_pair(args)? {
                NumericPair::Ints(_, 0) => Err(host_fail("division by zero")),
                NumericPair::Ints(a, b) => Ok(Value::Int(a / b)),
                NumericPair::Floats(_, b) if b == 0.0 => Err(host_fail("division by zero")),
                NumericPair::Floats(a, b) => Ok(Value::Float(a / b)),
            }
        });
        reg.register("math.mod", vec![any("a"), any("b")], true, |_, args| {
            match numeric_pair(args)? {
                NumericPair::Ints(_, 0) => Err(host_fail("modulo by zero")),
                NumericPair::Ints(a, b) => Ok(Value::Int(a.rem_euclid(b))),
                NumericPair::Floats(..) => {
                    Err(MappError::TypeError("math.mod takes integers".to_string()))
                }
            }
        });

        reg.register("compare.eq", vec![any("a"), any("b")], true, |_, args| {
            Ok(Value::Bool(values_equal(arg(args, 0)?, arg(args, 1)?)))
        });
        reg.register("compare.ne", vec![any("a"), any("b")], true, |_, args| {
            Ok(Value::Bool(!values_equal(arg(args, 0)?, arg(args, 1)?)))
        });
        reg.register("compare.lt", vec![any("a"), any("b")], true, |_, args| {
            Ok(Value::Bool(order(args)?.is_lt()))
        });
        reg.register("compare.le", vec![any("a"), any("b")], true, |_, args| {
            Ok(Value::Bool(order(args)?.is_le()))
        });
        reg.register("compare.gt", vec![any("a"), any("b")], true, |_, args| {
            Ok(Value::Bool(order(args)?.is_gt()))
        });
        reg.register("compare.ge", vec![any("a"), any("b")], true, |_, args| {
            Ok(Value::Bool(order(args)?.is_ge()))
        });

        reg.register("logic.and", vec![any("a"), any("b")], true, |_, args| {
            Ok(Value::Bool(arg(args, 0)?.truthy() && arg(args, 1)?.truthy()))
        });
        reg.register("logic.or", vec![any("a"), any("b")], true, |_, args| {
            Ok(Value::Bool(arg(args, 0)?.truthy() || arg(args, 1)?.truthy()))
        });
        reg.register("logic.not", vec![any("value")], true, |_, args| {
            Ok(Value::Bool(!arg(args, 0)?.truthy()))
        });

        let list_any = || ValueType::List(Box::new(ValueType::Any));
        reg.register(
            "list.length",
            vec![HostParam { name: "value", ty: list_any() }],
            true,
            |_, args| match arg(args, 0)? {
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                other => Err(MappError::TypeError(format!("expected list, got {}", other.type_name()))),
            },
        );
        reg.register(
            "list.get",
            vec![HostParam { name: "value", ty: list_any() }, int("index")],
            true,
            |_, args| match (arg(args, 0)?, arg(args, 1)?) {
                (Value::List(items), Value::Int(index)) => {
                    usize::try_from(*index)
                        .ok()
                        .and_then(|i| items.get(i))
                        .cloned()
                        .ok_or_else(|| host_fail(format!("index {index} out of range")))
                }
                _ => Err(MappError::TypeError("list.get takes (list, int)".to_string())),
            },
        );
        reg.register(
            "list.append",
            vec![HostParam { name: "value", ty: list_any() }, any("item")],
            true,
            |_, args| match arg(args, 0)? {
                Value::List(items) => {
                    let mut items = items.clone();
                    items.push(arg(args, 1)?.clone());
                    Ok(Value::List(items))
                }
                other => Err(MappError::TypeError(format!("expected list, got {}", other.type_name()))),
            },
        );
        reg.register(
            "list.contains",
            vec![HostParam { name: "value", ty: list_any() }, any("item")],
            true,
            |_, args| match arg(args, 0)? {
                Value::List(items) => {
                    let needle = arg(args, 1)?;
                    Ok(Value::Bool(items.iter().any(|i| values_equal(i, needle))))
                }
                other => Err(MappError::TypeError(format!("expected list, got {}", other.type_name()))),
            },
        );
        reg.register(
            "list.join",
            vec![HostParam { name: "value", ty: list_any() }, string("separator")],
            true,
            |_, args| match (arg(args, 0)?, arg(args, 1)?) {
                (Value::List(items), Value::Str(sep)) => Ok(Value::Str(
                    items.iter().map(Value::display).collect::<Vec<_>>().join(sep),
                )),
                _ => Err(MappError::TypeError("list.join takes (list, str)".to_string())),
            },
        );

        reg.register("str.concat", vec![string("a"), string("b")], true, |_, args| {
            match (arg(args, 0)?, arg(args, 1)?) {
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
                _ => Err(MappError::TypeError("str.concat takes (str, str)".to_string())),
            }
        });
        reg.register("str.upper", vec![string("value")], true, |_, args| match arg(args, 0)? {
            Value::Str(s) => Ok(Value::Str(s.to_uppercase())),
            _ => Err(MappError::TypeError("str.upper takes a str".to_string())),
        });
        reg.register("str.lower", vec![string("value")], true, |_, args| match arg(args, 0)? {
            Value::Str(s) => Ok(Value::Str(s.to_lowercase())),
            _ => Err(MappError::TypeError("str.lower takes a str".to_string())),
        });
        reg.register("str.length", vec![string("value")], true, |_, args| match arg(args, 0)? {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            _ => Err(MappError::TypeError("str.length takes a str".to_string())),
        });
        reg.register(
            "str.split",
            vec![string("value"), string("separator")],
            true,
            |_, args| match (arg(args, 0)?, arg(args, 1)?) {
                (Value::Str(s), Value::Str(sep)) => Ok(Value::List(
                    s.split(sep.as_str())
                        .filter(|part| !part.is_empty())
                        .map(|part| Value::Str(part.to_string()))
                        .collect(),
                )),
                _ => Err(MappError::TypeError("str.split takes (str, str)".to_string())),
            },
        );

        reg.register("datetime.now", vec![], false, |ctx, _| {
            Ok(Value::Datetime(ctx.clock.now()))
        });
        reg.register("date.today", vec![], false, |ctx, _| {
            let now = ctx.clock.now();
            Ok(Value::Datetime(now.date().and_hms_opt(0, 0, 0).unwrap_or(now)))
        });
        reg.register("date.weekday", vec![], false, |ctx, _| {
            use chrono::Datelike;
            Ok(Value::Int(i64::from(ctx.clock.now().weekday().num_days_from_monday())))
        });

        reg.register("random.randint", vec![int("low"), int("high")], false, |ctx, args| {
            match (arg(args, 0)?, arg(args, 1)?) {
                (Value::Int(low), Value::Int(high)) => Ok(Value::Int(ctx.random.randint(*low, *high))),
                _ => Err(MappError::TypeError("random.randint takes (int, int)".to_string())),
            }
        });
        reg.register("random.random", vec![], false, |ctx, _| {
            Ok(Value::Float(ctx.random.random()))
        });

        reg
    }
}

fn any(name: &'static str) -> HostParam {
    HostParam { name, ty: ValueType::Any }
}

fn int(name: &'static str) -> HostParam {
    HostParam { name, ty: ValueType::Int }
}

fn string(name: &'static str) -> HostParam {
    HostParam { name, ty: ValueType::Str }
}

fn arg<'a>(args: &'a [Value], index: usize) -> Result<&'a Value, MappError> {
    args.get(index)
        .ok_or_else(|| MappError::TypeError(format!("missing argument {index}")))
}

enum NumericPair {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numeric_pair(args: &[Value]) -> Result<NumericPair, MappError> {
    match (arg(args, 0)?, arg(args, 1)?) {
        (Value::Int(a), Value::Int(b)) => Ok(NumericPair::Ints(*a, *b)),
        (Value::Int(a), Value::Float(b)) => Ok(NumericPair::Floats(*a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Ok(NumericPair::Floats(*a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(NumericPair::Floats(*a, *b)),
        (a, b) => Err(MappError::TypeError(format!(
            "arithmetic on {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn arith(
    args: &[Value],
    op: &str,
    ints: impl Fn(i64, i64) -> Option<i64>,
    floats: impl Fn(f64, f64) -> f64,
) -> Result<Value, MappError> {
    match numeric_pair(args)? {
        NumericPair::Ints(a, b) => ints(a, b)
            .map(Value::Int)
            .ok_or_else(|| host_fail(format!("integer overflow in {op}"))),
        NumericPair::Floats(a, b) => Ok(Value::Float(floats(a, b))),
    }
}

fn order(args: &[Value]) -> Result<std::cmp::Ordering, MappError> {
    use std::cmp::Ordering;
    match (arg(args, 0)?, arg(args, 1)?) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        // Datetime comparisons are by instant, never by serialized string.
        (Value::Datetime(a), Value::Datetime(b)) => Ok(a.cmp(b)),
        (a, b) => {
            let (a, b) = match (a, b) {
                (Value::Int(a), Value::Float(b)) => (*a as f64, *b),
                (Value::Float(a), Value::Int(b)) => (*a, *b as f64),
                (Value::Float(a), Value::Float(b)) => (*a, *b),
                _ => {
                    return Err(MappError::TypeError(format!(
                        "cannot compare {} and {}",
                        a.type_name(),
                        b.type_name()
                    )))
                }
            };
            a.partial_cmp(&b)
                .ok_or_else(|| MappError::TypeError("comparison with NaN".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn named(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_add_int_and_float_promotion() {
        let reg = HostRegistry::standard();
        let ctx = Ctx::new();
        let sum = reg
            .invoke(&ctx, "math.add", &named(&[("a", Value::Int(1)), ("b", Value::Int(2))]))
            .unwrap();
        assert_eq!(sum, Value::Int(3));
        let sum = reg
            .invoke(&ctx, "math.add", &named(&[("a", Value::Int(1)), ("b", Value::Float(0.5))]))
            .unwrap();
        assert_eq!(sum, Value::Float(1.5));
    }

    #[test]
    fn test_division_by_zero_is_host_error() {
        let reg = HostRegistry::standard();
        let ctx = Ctx::new();
        let err = reg
            .invoke(&ctx, "math.div", &named(&[("a", Value::Int(1)), ("b", Value::Int(0))]))
            .unwrap_err();
        match err {
            MappError::HostError { name, cause } => {
                assert_eq!(name, "math.div");
                assert!(cause.contains("zero"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unknown_function() {
        let reg = HostRegistry::standard();
        let ctx = Ctx::new();
        let err = reg.invoke(&ctx, "no.such", &[]).unwrap_err();
        assert_eq!(err, MappError::UnknownOp("no.such".to_string()));
    }

    #[test]
    fn test_argument_coercion_by_descriptor() {
        let reg = HostRegistry::standard();
        let ctx = Ctx::new();
        // str.length declares (str); an int argument coerces via stringify.
        let out = reg
            .invoke(&ctx, "str.length", &named(&[("value", Value::Int(1234))]))
            .unwrap();
        assert_eq!(out, Value::Int(4));
    }

    #[test]
    fn test_weekday_with_pinned_clock() {
        let reg = HostRegistry::standard();
        // 2024-01-03 is a Wednesday.
        let wednesday =
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let ctx = Ctx::fixed(wednesday, 0);
        let day = reg.invoke(&ctx, "date.weekday", &[]).unwrap();
        assert_eq!(day, Value::Int(2));
    }

    #[test]
    fn test_randint_is_seeded_through_ctx() {
        let reg = HostRegistry::standard();
        let draw = |seed| {
            let ctx = Ctx::fixed(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                seed,
            );
            reg.invoke(
                &ctx,
                "random.randint",
                &named(&[("low", Value::Int(0)), ("high", Value::Int(1000))]),
            )
            .unwrap()
        };
        assert_eq!(draw(9), draw(9));
    }

    #[test]
    fn test_list_helpers() {
        let reg = HostRegistry::standard();
        let ctx = Ctx::new();
        let items = Value::List(vec![Value::Str("a".to_string()), Value::Str("b".to_string())]);
        assert_eq!(
            reg.invoke(&ctx, "list.length", &named(&[("value", items.clone())])).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            reg.invoke(
                &ctx,
                "list.contains",
                &named(&[("value", items.clone()), ("item", Value::Str("b".to_string()))])
            )
            .unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            reg.invoke(
                &ctx,
                "list.join",
                &named(&[("value", items), ("separator", Value::Str(", ".to_string()))])
            )
            .unwrap(),
            Value::Str("a, b".to_string())
        );
    }

    #[test]
    fn test_str_split() {
        let reg = HostRegistry::standard();
        let ctx = Ctx::new();
        let out = reg
            .invoke(
                &ctx,
                "str.split",
                &named(&[
                    ("value", Value::Str("one two three".to_string())),
                    ("separator", Value::Str(" ".to_string())),
                ]),
            )
            .unwrap();
        assert_eq!(
            out,
            Value::List(vec![
                Value::Str("one".to_string()),
                Value::Str("two".to_string()),
                Value::Str("three".to_string()),
            ])
        );
    }

    #[test]
    fn test_datetime_comparison_by_instant() {
        let reg = HostRegistry::standard();
        let ctx = Ctx::new();
        let earlier = Value::Datetime(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        );
        let later = Value::Datetime(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        );
        let out = reg
            .invoke(&ctx, "compare.lt", &named(&[("a", earlier), ("b", later)]))
            .unwrap();
        assert_eq!(out, Value::Bool(true));
    }
}
