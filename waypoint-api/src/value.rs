//! 端点返回值的数据模型
//!
//! 端点把结果交给分发器之前，先表达成 [`Value`]：除了 JSON 的基本形态之外，
//! 还能携带日期时间、枚举、分页器、条目列表、状态计数以及共享的对象图。
//! 对象（[`Record`]）通过 `Arc` 共享，因此可以出现重复引用甚至环，
//! 序列化器负责把这种结构拦下来。

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use parking_lot::RwLock;
use serde::Serialize;

/// 有序字段列表
pub type Fields = Vec<(String, Value)>;

/// 返回值树
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    /// 有序映射，键名参与脱敏检查
    Map(Fields),
    DateTime(DateTime<FixedOffset>),
    Enum(EnumValue),
    Paginator(Paginator),
    ItemsList(ItemsList),
    StatusCount(StatusCount),
    /// 共享的对象，身份即 `Arc` 指针
    Object(Arc<Record>),
}

impl Value {
    /// 由键值对构造有序映射
    pub fn map<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn empty_map() -> Self {
        Value::Map(Vec::new())
    }

    pub fn list<V, I>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// 通过 serde 转换任意可序列化的值
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Value::from)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// 映射中按键取值（同名键取最后一个）
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(fields) => fields.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// 值的种类名，用于日志和错误消息
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::DateTime(_) => "datetime",
            Value::Enum(_) => "enum",
            Value::Paginator(_) => "paginator",
            Value::ItemsList(_) => "items list",
            Value::StatusCount(_) => "status count",
            Value::Object(_) => "object",
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(v as f64),
        }
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::from(v as u64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(dt: DateTime<Tz>) -> Self {
        Value::DateTime(dt.fixed_offset())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt.and_utc().fixed_offset())
    }
}

impl From<NaiveDate> for Value {
    fn from(date: NaiveDate) -> Self {
        Value::from(date.and_hms_opt(0, 0, 0).unwrap_or_default())
    }
}

impl From<Arc<Record>> for Value {
    fn from(record: Arc<Record>) -> Self {
        Value::Object(record)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(Arc::new(record))
    }
}

/// 枚举值：有底层值时输出底层值，否则输出成员名
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub name: String,
    pub backing: Option<EnumBacking>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnumBacking {
    Int(i64),
    String(String),
}

impl EnumValue {
    pub fn unit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backing: None,
        }
    }

    pub fn backed_by_str(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backing: Some(EnumBacking::String(value.into())),
        }
    }

    pub fn backed_by_int(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            backing: Some(EnumBacking::Int(value)),
        }
    }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Self {
        Value::Enum(v)
    }
}

/// 分页器
///
/// 页码从 `base`（默认 1）开始，总条目数未知时没有最后一页。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    base: i64,
    page: i64,
    items_per_page: u64,
    item_count: Option<u64>,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            base: 1,
            page: 1,
            items_per_page: 1,
            item_count: None,
        }
    }
}

impl Paginator {
    pub fn new(page: i64, items_per_page: u64, item_count: u64) -> Self {
        Self::default()
            .with_page(page)
            .with_items_per_page(items_per_page)
            .with_item_count(item_count)
    }

    pub fn with_base(mut self, base: i64) -> Self {
        self.base = base;
        self
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }

    /// 每页条目数，至少为 1
    pub fn with_items_per_page(mut self, items_per_page: u64) -> Self {
        self.items_per_page = items_per_page.max(1);
        self
    }

    pub fn with_item_count(mut self, item_count: u64) -> Self {
        self.item_count = Some(item_count);
        self
    }

    /// 被裁剪到 `[first_page, last_page]` 之内的当前页
    pub fn page(&self) -> i64 {
        self.base.saturating_add(self.page_index())
    }

    fn page_index(&self) -> i64 {
        let requested = self.page.saturating_sub(self.base);
        let index = match self.page_count() {
            Some(count) => requested.min(last_index(count)),
            None => requested,
        };
        index.max(0)
    }

    pub fn page_count(&self) -> Option<u64> {
        self.item_count
            .map(|count| count.div_ceil(self.items_per_page))
    }

    pub fn item_count(&self) -> Option<u64> {
        self.item_count
    }

    pub fn items_per_page(&self) -> u64 {
        self.items_per_page
    }

    pub fn first_page(&self) -> i64 {
        self.base
    }

    pub fn last_page(&self) -> Option<i64> {
        self.page_count()
            .map(|count| self.base.saturating_add(last_index(count)))
    }

    pub fn is_first(&self) -> bool {
        self.page() == self.first_page()
    }

    pub fn is_last(&self) -> bool {
        match self.last_page() {
            Some(last) => self.page() >= last,
            None => false,
        }
    }

    /// 分页器的约定输出形态
    pub fn to_value(&self) -> Value {
        Value::map([
            ("page", Value::Int(self.page())),
            ("pageCount", Value::from(self.page_count().unwrap_or(0))),
            ("itemCount", Value::from(self.item_count.unwrap_or(0))),
            ("itemsPerPage", Value::from(self.items_per_page)),
            ("firstPage", Value::Int(self.first_page())),
            ("lastPage", Value::from(self.last_page())),
            ("isFirstPage", Value::Bool(self.is_first())),
            ("isLastPage", Value::Bool(self.is_last())),
        ])
    }
}

/// 页数对应的最后一页下标，空结果集仍有第 0 页
fn last_index(page_count: u64) -> i64 {
    i64::try_from(page_count)
        .unwrap_or(i64::MAX)
        .saturating_sub(1)
        .max(0)
}

impl From<Paginator> for Value {
    fn from(p: Paginator) -> Self {
        Value::Paginator(p)
    }
}

/// 条目列表中的一项：`id` 加任意数据
#[derive(Debug, Clone)]
pub struct Item {
    pub id: String,
    pub data: Fields,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.push((key.into(), value.into()));
        self
    }

    /// 数据字段 + `id`，已有的 `id` 被覆盖
    pub fn to_value(&self) -> Value {
        let mut fields = self.data.clone();
        let id = Value::String(self.id.clone());
        match fields.iter_mut().find(|(k, _)| k == "id") {
            Some((_, existing)) => *existing = id,
            None => fields.push(("id".to_string(), id)),
        }
        Value::Map(fields)
    }
}

/// 条目列表，必须放在 `items` 键下
#[derive(Debug, Clone, Default)]
pub struct ItemsList {
    items: Vec<Item>,
}

impl ItemsList {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn to_value(&self) -> Value {
        Value::List(self.items.iter().map(Item::to_value).collect())
    }
}

impl From<ItemsList> for Value {
    fn from(list: ItemsList) -> Self {
        Value::ItemsList(list)
    }
}

/// 按状态分组的计数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCount {
    pub key: String,
    pub count: i64,
    pub label: String,
}

impl StatusCount {
    /// 标签默认由键生成：`-` 换成空格，首字母大写
    pub fn new(key: impl Into<String>, count: i64) -> Self {
        let key = key.into();
        let label = waypoint_core::utils::naming::first_upper(&key.replace('-', " "));
        Self { key, count, label }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn to_value(&self) -> Value {
        Value::map([
            ("key", Value::String(self.key.clone())),
            ("label", Value::String(self.label.clone())),
            ("count", Value::Int(self.count)),
        ])
    }
}

impl From<StatusCount> for Value {
    fn from(s: StatusCount) -> Self {
        Value::StatusCount(s)
    }
}

/// 可共享、可变的对象
///
/// 以 `_` 开头的字段视为内部字段，不会被序列化。设置了展示字符串的对象
/// 在约定开启 `rewrite_stringable` 时直接输出该字符串。
pub struct Record {
    type_name: String,
    fields: RwLock<Fields>,
    display: Option<String>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: RwLock::new(Vec::new()),
            display: None,
        }
    }

    pub fn with_field(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn shared(self) -> Arc<Record> {
        Arc::new(self)
    }

    /// 设置字段，同名字段原位替换
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        let mut fields = self.fields.write();
        match fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = value,
            None => fields.push((name, value)),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }

    /// 在读锁内访问字段
    pub fn with_fields<R>(&self, f: impl FnOnce(&Fields) -> R) -> R {
        f(&self.fields.read())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 只输出字段名，避免在环形结构上无限递归
        let names: Vec<String> = self.with_fields(|fields| fields.iter().map(|(k, _)| k.clone()).collect());
        f.debug_struct("Record")
            .field("type_name", &self.type_name)
            .field("fields", &names)
            .finish()
    }
}
