//! Built-in methods of arrays, strings, numbers, promises and objects.
//!
//! Reading `value.name` for one of the names below yields a bound
//! [`Function::Method`](super::value::Function::Method); calling it lands in
//! [`Interpreter::call_method`]. Callbacks may mutate the array they iterate,
//! so items are re-read by index on every step instead of being borrowed
//! across the call.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use super::error::RuntimeError;
use super::format::{number_to_string, to_display};
use super::ops::{property_key, relative_index, same_value_zero, to_integer, to_number};
use super::state::Interpreter;
use super::value::Value;

pub(crate) const ARRAY_METHODS: &[&str] = &[
    "push", "pop", "shift", "unshift", "slice", "splice", "concat", "join", "indexOf",
    "lastIndexOf", "includes", "map", "filter", "reduce", "forEach", "find", "findIndex", "some",
    "every", "sort", "reverse", "at", "flat", "fill", "toString",
];
pub(crate) const STRING_METHODS: &[&str] = &[
    "toUpperCase", "toLowerCase", "trim", "trimStart", "trimEnd", "split", "slice", "substring",
    "indexOf", "lastIndexOf", "includes", "startsWith", "endsWith", "replace", "replaceAll",
    "repeat", "padStart", "padEnd", "charAt", "charCodeAt", "at", "concat", "toString",
];
pub(crate) const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];
pub(crate) const OBJECT_METHODS: &[&str] = &["hasOwnProperty", "toString"];
pub(crate) const PROMISE_METHODS: &[&str] = &["then", "catch", "finally"];

type Items = Rc<RefCell<Vec<Value>>>;

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

fn rfind_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(haystack.len());
    }
    haystack.windows(needle.len()).rposition(|window| window == needle)
}

fn flatten_into(out: &mut Vec<Value>, items: &[Value], depth: usize) {
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => flatten_into(out, &inner.borrow(), depth - 1),
            other => out.push(other.clone()),
        }
    }
}

fn integer_to_radix(n: f64, radix: u32) -> String {
    let mut magnitude = n.abs() as u128;
    if magnitude == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while magnitude > 0 {
        let digit = (magnitude % u128::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('0'));
        magnitude /= u128::from(radix);
    }
    if n < 0.0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

impl Interpreter {
    /// Calls built-in method `name` on `receiver`.
    pub(crate) fn call_method(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match receiver {
            Value::Array(items) => self.array_method(items, receiver, name, args),
            Value::Str(s) => self.string_method(s, name, args),
            Value::Number(n) => number_method(*n, name, &args),
            Value::Promise(promise) => Ok(match name {
                "then" => self.then(promise, arg(&args, 0), arg(&args, 1)),
                "catch" => self.then(promise, Value::Undefined, arg(&args, 0)),
                _ => self.finally(promise, arg(&args, 0)),
            }),
            Value::Object(obj) if name == "hasOwnProperty" => {
                let key = property_key(&arg(&args, 0));
                Ok(Value::Bool(obj.borrow().props.contains_key(&key)))
            }
            other => Ok(Value::string(to_display(other))),
        }
    }

    fn callback(args: &[Value]) -> Result<Value, RuntimeError> {
        let func = arg(args, 0);
        if func.is_callable() {
            Ok(func)
        } else {
            Err(RuntimeError::type_error(format!(
                "{} is not a function",
                to_display(&func)
            )))
        }
    }

    /// Calls `func(item, index, array)` for each index below the starting
    /// length, stopping early when `visit` returns `false`.
    fn each_item(
        &mut self,
        items: &Items,
        receiver: &Value,
        func: &Value,
        mut visit: impl FnMut(usize, Value, Value) -> bool,
    ) -> Result<(), RuntimeError> {
        let len = items.borrow().len();
        for index in 0..len {
            let item = items.borrow().get(index).cloned();
            let Some(item) = item else {
                break;
            };
            let args = vec![item.clone(), Value::Number(index as f64), receiver.clone()];
            let result = self.call_function(func, Value::Undefined, args)?;
            if !visit(index, item, result) {
                break;
            }
        }
        Ok(())
    }

    fn array_method(&mut self, items: &Items, receiver: &Value, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let len = items.borrow().len();
        let value = match name {
            "push" => {
                self.check_array_length(len + args.len())?;
                let mut items = items.borrow_mut();
                items.extend(args);
                Value::Number(items.len() as f64)
            }
            "pop" => items.borrow_mut().pop().unwrap_or(Value::Undefined),
            "shift" => {
                let mut items = items.borrow_mut();
                if items.is_empty() {
                    Value::Undefined
                } else {
                    items.remove(0)
                }
            }
            "unshift" => {
                self.check_array_length(len + args.len())?;
                let mut items = items.borrow_mut();
                items.splice(0..0, args);
                Value::Number(items.len() as f64)
            }
            "slice" => {
                let start = relative_index(&arg(&args, 0), len, 0);
                let end = relative_index(&arg(&args, 1), len, len);
                let slice = if start < end { items.borrow()[start..end].to_vec() } else { Vec::new() };
                Value::array(slice)
            }
            "splice" => {
                let start = relative_index(&arg(&args, 0), len, 0);
                let delete = match args.len() {
                    0 => 0,
                    1 => len - start,
                    _ => (to_integer(&args[1]).max(0.0) as usize).min(len - start),
                };
                let inserts: Vec<Value> = args.into_iter().skip(2).collect();
                self.check_array_length(len - delete + inserts.len())?;
                let removed: Vec<Value> = items.borrow_mut().splice(start..start + delete, inserts).collect();
                Value::array(removed)
            }
            "concat" => {
                let added: usize = args
                    .iter()
                    .map(|value| match value {
                        Value::Array(other) => other.borrow().len(),
                        _ => 1,
                    })
                    .sum();
                self.check_array_length(len + added)?;
                let mut out = items.borrow().clone();
                for value in args {
                    match value {
                        Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                }
                Value::array(out)
            }
            "join" => {
                let separator = match arg(&args, 0) {
                    Value::Undefined => ",".to_string(),
                    other => to_display(&other),
                };
                let parts: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|item| if item.is_nullish() { String::new() } else { to_display(item) })
                    .collect();
                Value::string(parts.join(&separator))
            }
            "indexOf" => {
                let needle = arg(&args, 0);
                let from = relative_index(&arg(&args, 1), len, 0);
                let found = items.borrow().iter().skip(from).position(|item| item.strict_equals(&needle));
                Value::Number(found.map(|i| (i + from) as f64).unwrap_or(-1.0))
            }
            "lastIndexOf" => {
                let needle = arg(&args, 0);
                let found = items.borrow().iter().rposition(|item| item.strict_equals(&needle));
                Value::Number(found.map(|i| i as f64).unwrap_or(-1.0))
            }
            "includes" => {
                let needle = arg(&args, 0);
                Value::Bool(items.borrow().iter().any(|item| same_value_zero(item, &needle)))
            }
            "at" => {
                let index = to_integer(&arg(&args, 0));
                let index = if index < 0.0 { len as f64 + index } else { index };
                if index < 0.0 {
                    Value::Undefined
                } else {
                    items.borrow().get(index as usize).cloned().unwrap_or(Value::Undefined)
                }
            }
            "reverse" => {
                items.borrow_mut().reverse();
                receiver.clone()
            }
            "fill" => {
                let fill = arg(&args, 0);
                let start = relative_index(&arg(&args, 1), len, 0);
                let end = relative_index(&arg(&args, 2), len, len);
                for slot in items.borrow_mut().iter_mut().take(end).skip(start) {
                    *slot = fill.clone();
                }
                receiver.clone()
            }
            "flat" => {
                let depth = match arg(&args, 0) {
                    Value::Undefined => 1,
                    other => to_integer(&other).max(0.0) as usize,
                };
                let mut out = Vec::new();
                flatten_into(&mut out, &items.borrow(), depth);
                Value::array(out)
            }
            "toString" => Value::string(to_display(receiver)),
            "sort" => {
                let snapshot = items.borrow().clone();
                let sorted = self.merge_sort(snapshot, &arg(&args, 0))?;
                *items.borrow_mut() = sorted;
                receiver.clone()
            }
            "reduce" => {
                let func = Self::callback(&args)?;
                let (mut acc, start) = if args.len() >= 2 {
                    (args[1].clone(), 0)
                } else {
                    match items.borrow().first() {
                        Some(first) => (first.clone(), 1),
                        None => {
                            return Err(RuntimeError::type_error(
                                "Reduce of empty array with no initial value",
                            ))
                        }
                    }
                };
                for index in start..len {
                    let item = items.borrow().get(index).cloned();
                    let Some(item) = item else {
                        break;
                    };
                    let call_args = vec![acc, item, Value::Number(index as f64), receiver.clone()];
                    acc = self.call_function(&func, Value::Undefined, call_args)?;
                }
                acc
            }
            "map" => {
                let func = Self::callback(&args)?;
                let mut out = Vec::with_capacity(len);
                self.each_item(items, receiver, &func, |_, _, result| {
                    out.push(result);
                    true
                })?;
                Value::array(out)
            }
            "filter" => {
                let func = Self::callback(&args)?;
                let mut out = Vec::new();
                self.each_item(items, receiver, &func, |_, item, result| {
                    if result.truthy() {
                        out.push(item);
                    }
                    true
                })?;
                Value::array(out)
            }
            "forEach" => {
                let func = Self::callback(&args)?;
                self.each_item(items, receiver, &func, |_, _, _| true)?;
                Value::Undefined
            }
            "find" | "findIndex" => {
                let func = Self::callback(&args)?;
                let mut found = None;
                self.each_item(items, receiver, &func, |index, item, result| {
                    if result.truthy() {
                        found = Some((index, item));
                    }
                    found.is_none()
                })?;
                match (name, found) {
                    ("find", Some((_, item))) => item,
                    ("find", None) => Value::Undefined,
                    (_, Some((index, _))) => Value::Number(index as f64),
                    (_, None) => Value::Number(-1.0),
                }
            }
            "some" => {
                let func = Self::callback(&args)?;
                let mut any = false;
                self.each_item(items, receiver, &func, |_, _, result| {
                    any = result.truthy();
                    !any
                })?;
                Value::Bool(any)
            }
            _ => {
                let func = Self::callback(&args)?;
                let mut all = true;
                self.each_item(items, receiver, &func, |_, _, result| {
                    all = result.truthy();
                    all
                })?;
                Value::Bool(all)
            }
        };
        Ok(value)
    }

    /// Stable sort that propagates comparator errors.
    fn merge_sort(&mut self, mut items: Vec<Value>, comparator: &Value) -> Result<Vec<Value>, RuntimeError> {
        if items.len() <= 1 {
            return Ok(items);
        }
        let right = items.split_off(items.len() / 2);
        let left = self.merge_sort(items, comparator)?;
        let right = self.merge_sort(right, comparator)?;

        let mut merged = Vec::with_capacity(left.len() + right.len());
        let mut left = left.into_iter().peekable();
        let mut right = right.into_iter().peekable();
        while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
            let take_right = self.compare_items(l, r, comparator)? == Ordering::Greater;
            let next = if take_right { right.next() } else { left.next() };
            merged.extend(next);
        }
        merged.extend(left);
        merged.extend(right);
        Ok(merged)
    }

    fn compare_items(&mut self, a: &Value, b: &Value, comparator: &Value) -> Result<Ordering, RuntimeError> {
        match (a, b) {
            (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
            (Value::Undefined, _) => return Ok(Ordering::Greater),
            (_, Value::Undefined) => return Ok(Ordering::Less),
            _ => {}
        }
        if comparator.is_callable() {
            let result = self.call_function(comparator, Value::Undefined, vec![a.clone(), b.clone()])?;
            return Ok(to_number(&result).partial_cmp(&0.0).unwrap_or(Ordering::Equal));
        }
        Ok(to_display(a).cmp(&to_display(b)))
    }

    fn string_method(&mut self, s: &Rc<str>, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len();
        let text_arg = |index: usize| to_display(&arg(&args, index));
        let char_string = |slice: &[char]| Value::string(slice.iter().collect());
        let value = match name {
            "toUpperCase" => Value::string(s.to_uppercase()),
            "toLowerCase" => Value::string(s.to_lowercase()),
            "trim" => Value::str(s.trim()),
            "trimStart" => Value::str(s.trim_start()),
            "trimEnd" => Value::str(s.trim_end()),
            "toString" => Value::Str(s.clone()),
            "split" => {
                let mut parts: Vec<Value> = match arg(&args, 0) {
                    Value::Undefined => vec![Value::Str(s.clone())],
                    separator => {
                        let separator = to_display(&separator);
                        if separator.is_empty() {
                            chars.iter().map(|c| Value::string(c.to_string())).collect()
                        } else {
                            s.split(separator.as_str()).map(Value::str).collect()
                        }
                    }
                };
                if let Some(limit) = args.get(1).filter(|v| !matches!(v, Value::Undefined)) {
                    parts.truncate(to_integer(limit).max(0.0) as usize);
                }
                Value::array(parts)
            }
            "slice" => {
                let start = relative_index(&arg(&args, 0), len, 0);
                let end = relative_index(&arg(&args, 1), len, len);
                if start < end { char_string(&chars[start..end]) } else { Value::str("") }
            }
            "substring" => {
                let clamp = |value: &Value, default: usize| match value {
                    Value::Undefined => default,
                    other => to_integer(other).clamp(0.0, len as f64) as usize,
                };
                let a = clamp(&arg(&args, 0), 0);
                let b = clamp(&arg(&args, 1), len);
                char_string(&chars[a.min(b)..a.max(b)])
            }
            "indexOf" | "includes" => {
                let needle: Vec<char> = text_arg(0).chars().collect();
                let from = to_integer(&arg(&args, 1)).clamp(0.0, len as f64) as usize;
                let found = find_chars(&chars, &needle, from);
                if name == "includes" {
                    Value::Bool(found.is_some())
                } else {
                    Value::Number(found.map(|i| i as f64).unwrap_or(-1.0))
                }
            }
            "lastIndexOf" => {
                let needle: Vec<char> = text_arg(0).chars().collect();
                Value::Number(rfind_chars(&chars, &needle).map(|i| i as f64).unwrap_or(-1.0))
            }
            "startsWith" => {
                let needle: Vec<char> = text_arg(0).chars().collect();
                let from = to_integer(&arg(&args, 1)).clamp(0.0, len as f64) as usize;
                Value::Bool(chars[from..].starts_with(&needle))
            }
            "endsWith" => {
                let needle: Vec<char> = text_arg(0).chars().collect();
                let end = match arg(&args, 1) {
                    Value::Undefined => len,
                    other => to_integer(&other).clamp(0.0, len as f64) as usize,
                };
                Value::Bool(chars[..end].ends_with(&needle))
            }
            "replace" | "replaceAll" => {
                let pattern = text_arg(0);
                let replacement = arg(&args, 1);
                let mut out = String::new();
                let mut rest: &str = s;
                let mut consumed = 0;
                loop {
                    let Some(at) = rest.find(pattern.as_str()) else {
                        break;
                    };
                    out.push_str(&rest[..at]);
                    let offset = s[..consumed + at].chars().count();
                    out.push_str(&self.replacement(&replacement, &pattern, offset, s)?);
                    let skip = at + pattern.len();
                    if pattern.is_empty() {
                        // An empty pattern matches before every character.
                        match rest[skip..].chars().next() {
                            Some(c) if name == "replaceAll" => {
                                out.push(c);
                                consumed += skip + c.len_utf8();
                                rest = &rest[skip + c.len_utf8()..];
                                continue;
                            }
                            _ => {
                                rest = &rest[skip..];
                                if name == "replaceAll" {
                                    break;
                                }
                            }
                        }
                    } else {
                        consumed += skip;
                        rest = &rest[skip..];
                    }
                    if name == "replace" {
                        break;
                    }
                }
                out.push_str(rest);
                Value::string(out)
            }
            "repeat" => {
                let count = to_number(&arg(&args, 0));
                let count = if count.is_nan() { 0.0 } else { count.trunc() };
                if count < 0.0 || count.is_infinite() {
                    return Err(RuntimeError::range_error(format!(
                        "Invalid count value: {}",
                        number_to_string(count)
                    )));
                }
                self.check_string_length(s.len().saturating_mul(count as usize))?;
                Value::string(s.repeat(count as usize))
            }
            "padStart" | "padEnd" => {
                let target = to_integer(&arg(&args, 0)).max(0.0) as usize;
                let filler = match arg(&args, 1) {
                    Value::Undefined => " ".to_string(),
                    other => to_display(&other),
                };
                if target <= len || filler.is_empty() {
                    Value::Str(s.clone())
                } else {
                    self.check_string_length(s.len().saturating_add(target - len))?;
                    let pad: String = filler.chars().cycle().take(target - len).collect();
                    if name == "padStart" {
                        Value::string(format!("{pad}{s}"))
                    } else {
                        Value::string(format!("{s}{pad}"))
                    }
                }
            }
            "charAt" | "charCodeAt" => {
                let index = to_integer(&arg(&args, 0));
                let c = (index >= 0.0).then(|| chars.get(index as usize)).flatten();
                match (name, c) {
                    ("charAt", Some(c)) => Value::string(c.to_string()),
                    ("charAt", None) => Value::str(""),
                    (_, Some(c)) => {
                        let mut units = [0u16; 2];
                        Value::Number(f64::from(c.encode_utf16(&mut units)[0]))
                    }
                    (_, None) => Value::Number(f64::NAN),
                }
            }
            "at" => {
                let index = to_integer(&arg(&args, 0));
                let index = if index < 0.0 { len as f64 + index } else { index };
                match (index >= 0.0).then(|| chars.get(index as usize)).flatten() {
                    Some(c) => Value::string(c.to_string()),
                    None => Value::Undefined,
                }
            }
            _ => {
                let mut out = s.to_string();
                for value in &args {
                    out.push_str(&to_display(value));
                }
                self.check_string_length(out.len())?;
                Value::string(out)
            }
        };
        Ok(value)
    }

    fn replacement(&mut self, replacement: &Value, matched: &str, offset: usize, whole: &Rc<str>) -> Result<String, RuntimeError> {
        if replacement.is_callable() {
            let args = vec![Value::str(matched), Value::Number(offset as f64), Value::Str(whole.clone())];
            let result = self.call_function(replacement, Value::Undefined, args)?;
            return Ok(to_display(&result));
        }
        Ok(to_display(replacement).replace("$&", matched))
    }
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    match name {
        "toFixed" => {
            let digits = to_integer(&arg(args, 0));
            if !(0.0..=100.0).contains(&digits) {
                return Err(RuntimeError::range_error(
                    "toFixed() digits argument must be between 0 and 100",
                ));
            }
            if !n.is_finite() || n.abs() >= 1e21 {
                return Ok(Value::string(number_to_string(n)));
            }
            Ok(Value::string(format!("{:.*}", digits as usize, n)))
        }
        _ => {
            let radix = match arg(args, 0) {
                Value::Undefined => 10.0,
                other => to_integer(&other),
            };
            if !(2.0..=36.0).contains(&radix) {
                return Err(RuntimeError::range_error(
                    "toString() radix must be between 2 and 36",
                ));
            }
            if radix == 10.0 || !n.is_finite() || n.fract() != 0.0 {
                return Ok(Value::string(number_to_string(n)));
            }
            Ok(Value::string(integer_to_radix(n, radix as u32)))
        }
    }
}
