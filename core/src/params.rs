//! 参数作用域
//!
//! `Params` 是一个带父链的只读为主的键值覆盖层：查找时先查自身，再沿父链向上。
//! 顶点自身的 args、条件分支参数、集群运行参数（调用方参数 + config setting 布尔值）
//! 各自是独立的实例。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

/// A single argument value. Deserialises directly from TOML/JSON scalars, arrays and tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
    Table(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Parse a command-line literal: booleans and numbers are recognised, anything else is a string.
    pub fn parse_literal(s: &str) -> Self {
        let trimmed = s.trim();
        if let Ok(b) = trimmed.parse::<bool>() {
            return Self::Bool(b);
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Str(s.to_string())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Table(_) => "table",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Table(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Conversion used when injecting params into typed operator slots.
///
/// Only scalars and lists of scalars are supported; a mismatched value leaves the slot untouched.
pub trait FromParam: Sized {
    fn from_param(value: &ParamValue) -> Option<Self>;
}

impl FromParam for bool {
    fn from_param(value: &ParamValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromParam for i64 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromParam for i32 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        i64::from_param(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromParam for u32 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        i64::from_param(value).and_then(|i| u32::try_from(i).ok())
    }
}

impl FromParam for usize {
    fn from_param(value: &ParamValue) -> Option<Self> {
        i64::from_param(value).and_then(|i| usize::try_from(i).ok())
    }
}

impl FromParam for f64 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromParam for f32 {
    fn from_param(value: &ParamValue) -> Option<Self> {
        f64::from_param(value).map(|f| f as f32)
    }
}

impl FromParam for String {
    fn from_param(value: &ParamValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl<T: FromParam> FromParam for Vec<T> {
    fn from_param(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::List(items) => items.iter().map(T::from_param).collect(),
            _ => None,
        }
    }
}

/// Parent-chained argument scope. Cloning yields another handle to the same scope.
#[derive(Clone, Default)]
pub struct Params {
    inner: Arc<ParamsInner>,
}

#[derive(Default)]
struct ParamsInner {
    values: RwLock<HashMap<String, ParamValue>>,
    parent: RwLock<Option<Params>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: HashMap<String, ParamValue>) -> Self {
        Self {
            inner: Arc::new(ParamsInner {
                values: RwLock::new(values),
                parent: RwLock::new(None),
            }),
        }
    }

    pub fn with_parent(parent: &Params) -> Self {
        let params = Self::new();
        params.set_parent(Some(parent));
        params
    }

    /// Look up `key` locally, then along the parent chain.
    pub fn get(&self, key: &str) -> Option<ParamValue> {
        let mut visited = HashSet::new();
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if !visited.insert(scope.ptr()) {
                break;
            }
            if let Some(v) = read(&scope.inner.values).get(key) {
                return Some(v.clone());
            }
            current = read(&scope.inner.parent).clone();
        }
        None
    }

    pub fn get_as<T: FromParam>(&self, key: &str) -> Option<T> {
        self.get(key).as_ref().and_then(T::from_param)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_as(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get_as(key)
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get_as(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<ParamValue>) {
        write(&self.inner.values).insert(key.into(), value.into());
    }

    /// Copy entries of `other` that are absent locally. Existing keys are left untouched.
    pub fn merge(&self, other: &HashMap<String, ParamValue>) {
        let mut values = write(&self.inner.values);
        for (k, v) in other {
            values.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    pub fn set_parent(&self, parent: Option<&Params>) {
        *write(&self.inner.parent) = parent.cloned();
    }

    pub fn parent(&self) -> Option<Params> {
        read(&self.inner.parent).clone()
    }

    /// Unlink from the parent scope, keeping own values.
    pub fn detach(&self) {
        *write(&self.inner.parent) = None;
    }

    /// Drop own values and the parent link.
    pub fn reset(&self) {
        write(&self.inner.values).clear();
        self.detach();
    }

    /// Local entries only.
    pub fn local(&self) -> HashMap<String, ParamValue> {
        read(&self.inner.values).clone()
    }

    /// Every visible key with its effective value; nearer scopes shadow farther ones.
    pub fn flatten(&self) -> HashMap<String, ParamValue> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if !visited.insert(scope.ptr()) {
                break;
            }
            current = scope.parent();
            chain.push(scope);
        }
        let mut out = HashMap::new();
        for scope in chain.iter().rev() {
            for (k, v) in read(&scope.inner.values).iter() {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }

    pub fn ptr_eq(&self, other: &Params) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn ptr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl From<HashMap<String, ParamValue>> for Params {
    fn from(values: HashMap<String, ParamValue>) -> Self {
        Self::from_map(values)
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Params")
            .field("values", &*read(&self.inner.values))
            .field("has_parent", &read(&self.inner.parent).is_some())
            .finish()
    }
}
