// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! XML-RPC codec.
//!
//! Only what the master and slave APIs exchange: scalar values, arrays,
//! structs (faults) and `nil`. Responses are parsed with `roxmltree`.

use crate::error::{ChaosError, Result};
use roxmltree::{Document, Node};
use std::collections::BTreeMap;
use std::fmt::Write;

/// XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Bool(bool),
    String(String),
    Double(f64),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Take a string, reporting `what` on mismatch.
    pub fn into_string(self, what: &str) -> Result<String> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(ChaosError::Decode(format!(
                "{}: expected string, got {:?}",
                what, other
            ))),
        }
    }

    /// Take an array, reporting `what` on mismatch.
    pub fn into_array(self, what: &str) -> Result<Vec<Value>> {
        match self {
            Self::Array(items) => Ok(items),
            other => Err(ChaosError::Decode(format!(
                "{}: expected array, got {:?}",
                what, other
            ))),
        }
    }

    /// Take an array of strings.
    pub fn into_string_list(self, what: &str) -> Result<Vec<String>> {
        self.into_array(what)?
            .into_iter()
            .map(|v| v.into_string(what))
            .collect()
    }

    /// Take `[[name, [member, ...]], ...]`, the shape of system state entries.
    pub fn into_membership_list(self, what: &str) -> Result<Vec<(String, Vec<String>)>> {
        self.into_array(what)?
            .into_iter()
            .map(|entry| {
                let mut pair = entry.into_array(what)?.into_iter();
                match (pair.next(), pair.next()) {
                    (Some(name), Some(members)) => {
                        Ok((name.into_string(what)?, members.into_string_list(what)?))
                    }
                    _ => Err(ChaosError::Decode(format!("{}: short entry", what))),
                }
            })
            .collect()
    }

    /// Take `[[a, b], ...]` string pairs.
    pub fn into_pair_list(self, what: &str) -> Result<Vec<(String, String)>> {
        self.into_array(what)?
            .into_iter()
            .map(|entry| {
                let mut pair = entry.into_array(what)?.into_iter();
                match (pair.next(), pair.next()) {
                    (Some(a), Some(b)) => Ok((a.into_string(what)?, b.into_string(what)?)),
                    _ => Err(ChaosError::Decode(format!("{}: short pair", what))),
                }
            })
            .collect()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

/// Decoded `methodResponse`.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlRpcReply {
    Value(Value),
    Fault { code: i32, message: String },
}

/// Encode a `methodCall` document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("<?xml version=\"1.0\"?><methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

fn encode_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => {
            let _ = write!(out, "<i4>{}</i4>", i);
        }
        Value::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
        }
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s));
            out.push_str("</string>");
        }
        Value::Double(d) => {
            let _ = write!(out, "<double>{}</double>", d);
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name));
                out.push_str("</name>");
                encode_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// Decode a `methodResponse` document.
pub fn decode_response(body: &str) -> Result<XmlRpcReply> {
    let doc = Document::parse(body).map_err(|e| ChaosError::Decode(e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "methodResponse" {
        return Err(ChaosError::Decode(format!(
            "unexpected root element <{}>",
            root.tag_name().name()
        )));
    }

    let body = first_element(root)
        .ok_or_else(|| ChaosError::Decode("empty methodResponse".into()))?;

    match body.tag_name().name() {
        "params" => {
            let value = body
                .descendants()
                .find(|n| n.has_tag_name("value"))
                .ok_or_else(|| ChaosError::Decode("response without value".into()))?;
            Ok(XmlRpcReply::Value(decode_value(value)?))
        }
        "fault" => {
            let value = first_element(body)
                .ok_or_else(|| ChaosError::Decode("fault without value".into()))?;
            let fault = decode_value(value)?;
            let (code, message) = match fault {
                Value::Struct(members) => (
                    members
                        .get("faultCode")
                        .and_then(Value::as_i32)
                        .unwrap_or(-1),
                    members
                        .get("faultString")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                ),
                _ => (-1, String::new()),
            };
            Ok(XmlRpcReply::Fault { code, message })
        }
        other => Err(ChaosError::Decode(format!("unexpected element <{}>", other))),
    }
}

fn first_element<'a, 'input>(node: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.is_element())
}

fn decode_value(node: Node) -> Result<Value> {
    let Some(typed) = first_element(node) else {
        // Untyped <value> content is a string.
        return Ok(Value::String(node.text().unwrap_or_default().to_string()));
    };

    let text = typed.text().unwrap_or_default();
    match typed.tag_name().name() {
        "i4" | "int" | "i8" => text
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| ChaosError::Decode(format!("bad integer '{}'", text))),
        "boolean" => match text.trim() {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(ChaosError::Decode(format!("bad boolean '{}'", other))),
        },
        "string" => Ok(Value::String(text.to_string())),
        "double" => text
            .trim()
            .parse()
            .map(Value::Double)
            .map_err(|_| ChaosError::Decode(format!("bad double '{}'", text))),
        "array" => {
            let items = typed
                .children()
                .find(|n| n.has_tag_name("data"))
                .map(|data| {
                    data.children()
                        .filter(|n| n.has_tag_name("value"))
                        .map(decode_value)
                        .collect::<Result<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(items))
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children().filter(|n| n.has_tag_name("member")) {
                let name = member
                    .children()
                    .find(|n| n.has_tag_name("name"))
                    .and_then(|n| n.text())
                    .unwrap_or_default()
                    .to_string();
                if let Some(value) = member.children().find(|n| n.has_tag_name("value")) {
                    members.insert(name, decode_value(value)?);
                }
            }
            Ok(Value::Struct(members))
        }
        "nil" => Ok(Value::Nil),
        "base64" | "dateTime.iso8601" => Ok(Value::String(text.trim().to_string())),
        other => Err(ChaosError::Decode(format!("unsupported type <{}>", other))),
    }
}

/// Unpack the `[code, statusMessage, value]` triple every ROS API call returns.
pub fn ros_status(method: &str, reply: XmlRpcReply) -> Result<Value> {
    let value = match reply {
        XmlRpcReply::Value(value) => value,
        XmlRpcReply::Fault { code, message } => {
            return Err(ChaosError::protocol(method, code, message))
        }
    };

    let mut triple = value.into_array(method)?.into_iter();
    let (code, message, value) = match (triple.next(), triple.next(), triple.next()) {
        (Some(code), Some(message), Some(value)) => (code, message, value),
        _ => {
            return Err(ChaosError::Decode(format!(
                "{}: expected [code, message, value]",
                method
            )))
        }
    };

    let code = code
        .as_i32()
        .ok_or_else(|| ChaosError::Decode(format!("{}: non-integer status code", method)))?;
    if code != 1 {
        let message = message.as_str().unwrap_or_default().to_string();
        return Err(ChaosError::protocol(method, code, message));
    }
    Ok(value)
}
