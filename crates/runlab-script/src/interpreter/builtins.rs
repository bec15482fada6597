//! The runtime library injected into every run.
//!
//! Nothing outside this module is reachable from a script: no file system,
//! network, process or environment access exists. Globals are installed
//! fresh for each [`Interpreter`], so no state leaks between runs.

use indexmap::IndexMap;
use rand::Rng;
use runlab_core::LogKind;

use crate::instrument::TRACE_HOOK;

use super::env::Env;
use super::error::RuntimeError;
use super::format::{format_console_args, from_json, json_stringify, to_display};
use super::ops::{to_integer, to_number};
use super::promise::TimerAction;
use super::state::{own_keys, Interpreter};
use super::value::{Promise, PromiseState, Value};

const MATH_FUNCTIONS: &[&str] = &[
    "abs", "floor", "ceil", "round", "trunc", "sign", "sqrt", "cbrt", "pow", "min", "max",
    "random", "log", "log2", "log10", "exp", "sin", "cos", "tan", "asin", "acos", "atan",
    "atan2", "hypot",
];
const OBJECT_STATICS: &[&str] = &["keys", "values", "entries", "assign"];
const ARRAY_STATICS: &[&str] = &["isArray", "of", "from"];
const PROMISE_STATICS: &[&str] = &["resolve", "reject", "all"];
const NUMBER_STATICS: &[&str] = &["isInteger", "isFinite", "isNaN", "isSafeInteger", "parseFloat", "parseInt"];
const ERROR_CLASSES: &[&str] = &["Error", "TypeError", "RangeError", "ReferenceError", "SyntaxError"];

/// A built-in function implemented in Rust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFn {
    Console(LogKind),
    Trace,
    Math(&'static str),
    JsonStringify,
    JsonParse,
    ObjectCtor,
    ObjectStatic(&'static str),
    ArrayCtor,
    ArrayStatic(&'static str),
    PromiseCtor,
    PromiseStatic(&'static str),
    NumberCtor,
    NumberStatic(&'static str),
    StringCtor,
    BooleanCtor,
    ParseInt,
    ParseFloat,
    IsNaN,
    IsFinite,
    ErrorCtor(&'static str),
    SetTimeout,
    ClearTimeout,
    Delay,
}

fn lookup(list: &[&'static str], key: &str) -> Option<&'static str> {
    list.iter().copied().find(|name| *name == key)
}

impl HostFn {
    pub fn name(&self) -> &'static str {
        match *self {
            HostFn::Console(kind) => kind.as_str(),
            HostFn::Trace => TRACE_HOOK,
            HostFn::Math(name)
            | HostFn::ObjectStatic(name)
            | HostFn::ArrayStatic(name)
            | HostFn::PromiseStatic(name)
            | HostFn::NumberStatic(name)
            | HostFn::ErrorCtor(name) => name,
            HostFn::JsonStringify => "stringify",
            HostFn::JsonParse => "parse",
            HostFn::ObjectCtor => "Object",
            HostFn::ArrayCtor => "Array",
            HostFn::PromiseCtor => "Promise",
            HostFn::NumberCtor => "Number",
            HostFn::StringCtor => "String",
            HostFn::BooleanCtor => "Boolean",
            HostFn::ParseInt => "parseInt",
            HostFn::ParseFloat => "parseFloat",
            HostFn::IsNaN => "isNaN",
            HostFn::IsFinite => "isFinite",
            HostFn::SetTimeout => "setTimeout",
            HostFn::ClearTimeout => "clearTimeout",
            HostFn::Delay => "delay",
        }
    }

    /// Static members of constructor functions (`Object.keys`, `Number.EPSILON`).
    pub fn static_member(&self, key: &str) -> Option<Value> {
        let host = match self {
            HostFn::ObjectCtor => HostFn::ObjectStatic(lookup(OBJECT_STATICS, key)?),
            HostFn::ArrayCtor => HostFn::ArrayStatic(lookup(ARRAY_STATICS, key)?),
            HostFn::PromiseCtor => HostFn::PromiseStatic(lookup(PROMISE_STATICS, key)?),
            HostFn::NumberCtor => {
                let constant = match key {
                    "MAX_SAFE_INTEGER" => 9_007_199_254_740_991.0,
                    "MIN_SAFE_INTEGER" => -9_007_199_254_740_991.0,
                    "EPSILON" => f64::EPSILON,
                    "MAX_VALUE" => f64::MAX,
                    "MIN_VALUE" => 5e-324,
                    "POSITIVE_INFINITY" => f64::INFINITY,
                    "NEGATIVE_INFINITY" => f64::NEG_INFINITY,
                    "NaN" => f64::NAN,
                    _ => return Some(Value::host(HostFn::NumberStatic(lookup(NUMBER_STATICS, key)?))),
                };
                return Some(Value::Number(constant));
            }
            _ => return None,
        };
        Some(Value::host(host))
    }

    /// `value instanceof <this constructor>`.
    pub fn is_instance(&self, value: &Value) -> bool {
        match self {
            HostFn::ErrorCtor(class) => match value {
                Value::Object(obj) if value.is_error() => {
                    *class == "Error"
                        || matches!(obj.borrow().props.get("name"), Some(Value::Str(name)) if &**name == *class)
                }
                _ => false,
            },
            HostFn::ArrayCtor => matches!(value, Value::Array(_)),
            HostFn::PromiseCtor => matches!(value, Value::Promise(_)),
            HostFn::ObjectCtor => matches!(
                value,
                Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_)
            ),
            _ => false,
        }
    }
}

fn namespace(members: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
    Value::object(
        members
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

/// Binds the runtime library into a fresh global scope.
///
/// The trace hook is bound only for instrumented runs.
pub fn install_globals(env: &Env, trace_enabled: bool) {
    let console = [LogKind::Log, LogKind::Error, LogKind::Warn, LogKind::Info]
        .map(|kind| (kind.as_str(), Value::host(HostFn::Console(kind))));
    env.define("console", namespace(console));

    let mut math: Vec<(&'static str, Value)> = MATH_FUNCTIONS
        .iter()
        .map(|&name| (name, Value::host(HostFn::Math(name))))
        .collect();
    math.extend([
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        ("LN2", Value::Number(std::f64::consts::LN_2)),
        ("LN10", Value::Number(std::f64::consts::LN_10)),
        ("LOG2E", Value::Number(std::f64::consts::LOG2_E)),
        ("LOG10E", Value::Number(std::f64::consts::LOG10_E)),
        ("SQRT2", Value::Number(std::f64::consts::SQRT_2)),
    ]);
    env.define("Math", namespace(math));
    env.define(
        "JSON",
        namespace([
            ("stringify", Value::host(HostFn::JsonStringify)),
            ("parse", Value::host(HostFn::JsonParse)),
        ]),
    );

    for host in [
        HostFn::ObjectCtor,
        HostFn::ArrayCtor,
        HostFn::PromiseCtor,
        HostFn::NumberCtor,
        HostFn::StringCtor,
        HostFn::BooleanCtor,
        HostFn::ParseInt,
        HostFn::ParseFloat,
        HostFn::IsNaN,
        HostFn::IsFinite,
        HostFn::SetTimeout,
        HostFn::ClearTimeout,
        HostFn::Delay,
    ] {
        env.define(host.name(), Value::host(host));
    }
    for &class in ERROR_CLASSES {
        env.define(class, Value::host(HostFn::ErrorCtor(class)));
    }

    env.define("undefined", Value::Undefined);
    env.define("NaN", Value::Number(f64::NAN));
    env.define("Infinity", Value::Number(f64::INFINITY));

    if trace_enabled {
        env.define(TRACE_HOOK, Value::host(HostFn::Trace));
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

fn number_arg(args: &[Value], index: usize) -> f64 {
    args.get(index).map(to_number).unwrap_or(f64::NAN)
}

/// JavaScript `parseInt`.
pub fn parse_int(text: &str, radix: Option<u32>) -> f64 {
    let mut rest = text.trim_start();
    let mut sign = 1.0;
    if let Some(stripped) = rest.strip_prefix('-') {
        sign = -1.0;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }
    let mut radix = radix.unwrap_or(0);
    if matches!(radix, 0 | 16) {
        if let Some(stripped) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            rest = stripped;
            radix = 16;
        } else if radix == 0 {
            radix = 10;
        }
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: Vec<u32> = rest.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    sign * digits
        .iter()
        .fold(0.0, |acc, digit| acc * f64::from(radix) + f64::from(*digit))
}

/// JavaScript `parseFloat`: the longest numeric prefix.
pub fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    for infinity in ["Infinity", "+Infinity"] {
        if text.starts_with(infinity) {
            return f64::INFINITY;
        }
    }
    if text.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
    }
    if end == digits_start || &text[digits_start..end] == "." {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    text[..end].parse().unwrap_or(f64::NAN)
}

fn radix_arg(value: &Value) -> Option<u32> {
    match value {
        Value::Undefined => None,
        other => Some(to_integer(other) as u32),
    }
}

impl Interpreter {
    fn console_call(&mut self, kind: LogKind, args: &[Value]) {
        let content = format_console_args(args);
        if let Some(entry) = self.console.emit(kind, content) {
            if let Some(trace) = self.trace.as_mut() {
                trace.record_log(entry.kind, &entry.content);
            }
        }
    }

    fn math(&mut self, name: &str, args: &[Value]) -> f64 {
        let x = number_arg(args, 0);
        match name {
            "abs" => x.abs(),
            "floor" => x.floor(),
            "ceil" => x.ceil(),
            "round" => (x + 0.5).floor(),
            "trunc" => x.trunc(),
            "sign" if x == 0.0 || x.is_nan() => x,
            "sign" => x.signum(),
            "sqrt" => x.sqrt(),
            "cbrt" => x.cbrt(),
            "pow" => {
                let y = number_arg(args, 1);
                if y.is_nan() || (x.abs() == 1.0 && y.is_infinite()) {
                    f64::NAN
                } else {
                    x.powf(y)
                }
            }
            "min" | "max" => {
                let mut acc = if name == "min" { f64::INFINITY } else { f64::NEG_INFINITY };
                for value in args {
                    let n = to_number(value);
                    if n.is_nan() {
                        return f64::NAN;
                    }
                    acc = if name == "min" { acc.min(n) } else { acc.max(n) };
                }
                acc
            }
            "random" => self.rng.gen::<f64>(),
            "log" => x.ln(),
            "log2" => x.log2(),
            "log10" => x.log10(),
            "exp" => x.exp(),
            "sin" => x.sin(),
            "cos" => x.cos(),
            "tan" => x.tan(),
            "asin" => x.asin(),
            "acos" => x.acos(),
            "atan" => x.atan(),
            "atan2" => x.atan2(number_arg(args, 1)),
            "hypot" => args.iter().map(to_number).map(|n| n * n).sum::<f64>().sqrt(),
            _ => f64::NAN,
        }
    }

    /// Calls a built-in function.
    pub(crate) fn call_host(&mut self, host: HostFn, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let value = match host {
            HostFn::Console(kind) => {
                self.console_call(kind, &args);
                Value::Undefined
            }
            HostFn::Trace => {
                let globals = self.globals.clone();
                self.record_checkpoint(&args, &globals);
                Value::Undefined
            }
            HostFn::Math(name) => Value::Number(self.math(name, &args)),
            HostFn::JsonStringify => {
                let indent = arg(&args, 2);
                let pretty = match &indent {
                    Value::Number(n) => *n >= 1.0,
                    Value::Str(s) => !s.is_empty(),
                    _ => false,
                };
                match json_stringify(&arg(&args, 0), pretty)? {
                    Some(text) => Value::string(text),
                    None => Value::Undefined,
                }
            }
            HostFn::JsonParse => {
                let text = to_display(&arg(&args, 0));
                let json: serde_json::Value =
                    serde_json::from_str(&text).map_err(|e| RuntimeError::SyntaxError {
                        message: format!("Unexpected token in JSON: {e}"),
                    })?;
                from_json(&json)
            }
            HostFn::ObjectCtor => match arg(&args, 0) {
                value @ (Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_)) => value,
                _ => Value::object(IndexMap::new()),
            },
            HostFn::ObjectStatic(name) => self.object_static(name, &args)?,
            HostFn::ArrayCtor => self.array_from_ctor_args(args)?,
            HostFn::ArrayStatic(name) => self.array_static(name, args)?,
            HostFn::PromiseCtor => {
                return Err(RuntimeError::type_error(
                    "Promise constructor cannot be invoked without 'new'",
                ))
            }
            HostFn::PromiseStatic(name) => match name {
                "resolve" => Value::Promise(self.promise_of(arg(&args, 0))),
                "reject" => Value::Promise(Promise::settled(PromiseState::Rejected(arg(&args, 0)))),
                _ => {
                    let items = match arg(&args, 0) {
                        Value::Array(items) => items.borrow().clone(),
                        other => {
                            return Err(RuntimeError::type_error(format!(
                                "{} is not iterable",
                                to_display(&other)
                            )))
                        }
                    };
                    self.promise_all(items)
                }
            },
            HostFn::NumberCtor => Value::Number(args.first().map(to_number).unwrap_or(0.0)),
            HostFn::NumberStatic(name) => {
                let value = arg(&args, 0);
                let n = match value {
                    Value::Number(n) => Some(n),
                    _ => None,
                };
                match name {
                    "isInteger" => Value::Bool(n.is_some_and(|n| n.is_finite() && n.fract() == 0.0)),
                    "isSafeInteger" => Value::Bool(
                        n.is_some_and(|n| n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0),
                    ),
                    "isFinite" => Value::Bool(n.is_some_and(f64::is_finite)),
                    "isNaN" => Value::Bool(n.is_some_and(f64::is_nan)),
                    "parseFloat" => Value::Number(parse_float(&to_display(&value))),
                    _ => Value::Number(parse_int(&to_display(&value), radix_arg(&arg(&args, 1)))),
                }
            }
            HostFn::StringCtor => match args.first() {
                Some(value) => Value::string(to_display(value)),
                None => Value::str(""),
            },
            HostFn::BooleanCtor => Value::Bool(arg(&args, 0).truthy()),
            HostFn::ParseInt => Value::Number(parse_int(
                &to_display(&arg(&args, 0)),
                radix_arg(&arg(&args, 1)),
            )),
            HostFn::ParseFloat => Value::Number(parse_float(&to_display(&arg(&args, 0)))),
            HostFn::IsNaN => Value::Bool(number_arg(&args, 0).is_nan()),
            HostFn::IsFinite => Value::Bool(number_arg(&args, 0).is_finite()),
            HostFn::ErrorCtor(class) => make_error(class, &args),
            HostFn::SetTimeout => {
                let mut args = args.into_iter();
                let func = args.next().unwrap_or(Value::Undefined);
                if !func.is_callable() {
                    return Err(RuntimeError::type_error(
                        "The \"callback\" argument must be of type function",
                    ));
                }
                let delay = args.next().map(|v| to_number(&v)).unwrap_or(0.0);
                let id = self.schedule_timer(
                    delay,
                    TimerAction::Callback {
                        func,
                        args: args.collect(),
                    },
                );
                Value::Number(id as f64)
            }
            HostFn::ClearTimeout => {
                let id = number_arg(&args, 0);
                if id.is_finite() && id >= 0.0 {
                    self.clear_timer(id as u64);
                }
                Value::Undefined
            }
            HostFn::Delay => {
                let promise = Promise::pending();
                self.schedule_timer(number_arg(&args, 0), TimerAction::Resolve(promise.clone()));
                Value::Promise(promise)
            }
        };
        Ok(value)
    }

    /// `new Host(...)`. `None` when the built-in is not a constructor.
    pub(crate) fn construct_host(&mut self, host: HostFn, args: Vec<Value>) -> Option<Result<Value, RuntimeError>> {
        match host {
            HostFn::PromiseCtor => Some(self.construct_promise(&arg(&args, 0))),
            HostFn::ErrorCtor(class) => Some(Ok(make_error(class, &args))),
            HostFn::ArrayCtor => Some(self.array_from_ctor_args(args)),
            HostFn::ObjectCtor => Some(self.call_host(host, args)),
            _ => None,
        }
    }

    fn object_static(&mut self, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let target = arg(args, 0);
        if target.is_nullish() {
            return Err(RuntimeError::type_error(
                "Cannot convert undefined or null to object",
            ));
        }
        let keys = own_keys(&target);
        let value = match name {
            "keys" => Value::array(keys.into_iter().map(Value::string).collect()),
            "values" => {
                let mut values = Vec::with_capacity(keys.len());
                for key in &keys {
                    values.push(self.get_property(&target, key)?);
                }
                Value::array(values)
            }
            "entries" => {
                let mut entries = Vec::with_capacity(keys.len());
                for key in keys {
                    let value = self.get_property(&target, &key)?;
                    entries.push(Value::array(vec![Value::string(key), value]));
                }
                Value::array(entries)
            }
            _ => {
                for source in args.iter().skip(1).filter(|s| !s.is_nullish()) {
                    for key in own_keys(source) {
                        let value = self.get_property(source, &key)?;
                        self.set_property(&target, &key, value)?;
                    }
                }
                target
            }
        };
        Ok(value)
    }

    fn array_static(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let value = match name {
            "isArray" => Value::Bool(matches!(arg(&args, 0), Value::Array(_))),
            "of" => Value::array(args),
            _ => {
                let source = arg(&args, 0);
                let items = match &source {
                    Value::Array(items) => items.borrow().clone(),
                    Value::Str(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
                    Value::Object(_) => {
                        let len = to_number(&self.get_property(&source, "length")?);
                        let len = if len.is_finite() && len > 0.0 { len as usize } else { 0 };
                        self.check_array_length(len)?;
                        let mut items = Vec::with_capacity(len);
                        for index in 0..len {
                            items.push(self.get_property(&source, &index.to_string())?);
                        }
                        items
                    }
                    _ => Vec::new(),
                };
                let map = arg(&args, 1);
                if map.is_callable() {
                    let mut mapped = Vec::with_capacity(items.len());
                    for (index, item) in items.into_iter().enumerate() {
                        mapped.push(self.call_function(&map, Value::Undefined, vec![item, Value::Number(index as f64)])?);
                    }
                    Value::array(mapped)
                } else {
                    Value::array(items)
                }
            }
        };
        Ok(value)
    }

    /// `Array(n)` makes `n` holes; any other argument list becomes the items.
    fn array_from_ctor_args(&self, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match args.as_slice() {
            [Value::Number(n)] => {
                if *n < 0.0 || n.fract() != 0.0 || *n > u32::MAX as f64 {
                    return Err(RuntimeError::range_error("Invalid array length"));
                }
                self.check_array_length(*n as usize)?;
                Ok(Value::array(vec![Value::Undefined; *n as usize]))
            }
            _ => Ok(Value::array(args)),
        }
    }
}

fn make_error(class: &str, args: &[Value]) -> Value {
    let message = match args.first() {
        None | Some(Value::Undefined) => String::new(),
        Some(value) => to_display(value),
    };
    Value::error(class, &message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::ops::string_to_number;

    #[test]
    fn parse_int_reads_the_leading_digits() {
        assert_eq!(parse_int("42px", None), 42.0);
        assert_eq!(parse_int("  -7", None), -7.0);
        assert_eq!(parse_int("0xff", None), 255.0);
        assert_eq!(parse_int("101", Some(2)), 5.0);
        assert_eq!(parse_int("0x1f", Some(0)), 31.0);
        assert_eq!(parse_int("0x1f", Some(10)), 0.0);
        assert!(parse_int("px", None).is_nan());
    }

    #[test]
    fn parse_float_reads_the_longest_prefix() {
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert_eq!(parse_float("2e"), 2.0);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float(".").is_nan());
        assert_eq!(string_to_number("1e3"), 1000.0);
    }

    #[test]
    fn static_members_resolve_by_name() {
        assert!(matches!(
            HostFn::ObjectCtor.static_member("keys"),
            Some(Value::Function(_))
        ));
        assert!(HostFn::ObjectCtor.static_member("freeze").is_none());
        assert!(matches!(
            HostFn::NumberCtor.static_member("MAX_SAFE_INTEGER"),
            Some(Value::Number(n)) if n == 9_007_199_254_740_991.0
        ));
    }

    #[test]
    fn error_instances_match_their_class() {
        let err = Value::error("TypeError", "bad");
        assert!(HostFn::ErrorCtor("Error").is_instance(&err));
        assert!(HostFn::ErrorCtor("TypeError").is_instance(&err));
        assert!(!HostFn::ErrorCtor("RangeError").is_instance(&err));
        assert!(!HostFn::ArrayCtor.is_instance(&err));
    }
}
