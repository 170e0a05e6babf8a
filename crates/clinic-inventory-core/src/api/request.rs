//! Inbound requests and their parsed, validated form.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ApiError, ApiResult};
use crate::models::{Category, ClinicVisit, DispensedItem, InventoryItem, ItemType, Supplier};

/// Raw request as received from the external handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    pub resource: String,
    /// Row id: a positive integer, as a number or a numeric string
    #[serde(default)]
    pub id: Option<Value>,
    /// Name substring for searches
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
    /// Staff member performing the request
    #[serde(default)]
    pub actor: Option<String>,
}

impl Request {
    pub fn new(method: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            resource: resource.into(),
            id: None,
            query: None,
            body: None,
            actor: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Medicine,
    Supply,
    Category,
    Supplier,
    Visit,
}

impl Resource {
    /// Accepts singular and plural resource names.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "medicine" | "medicines" => Some(Resource::Medicine),
            "supply" | "supplies" => Some(Resource::Supply),
            "category" | "categories" => Some(Resource::Category),
            "supplier" | "suppliers" => Some(Resource::Supplier),
            "visit" | "visits" | "clinic-visits" => Some(Resource::Visit),
            _ => None,
        }
    }
}

/// One CRUD operation on a resource, carrying its validated input.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation<B> {
    List,
    Search(String),
    Get(i64),
    Create(B),
    Update(i64, B),
    Delete(i64),
}

impl<B: BodyInput> Operation<B> {
    /// Map method and id onto an operation, validating the id and body.
    pub fn parse(method: Method, request: &Request) -> ApiResult<Self> {
        match method {
            Method::Get => match &request.id {
                Some(id) => Ok(Operation::Get(parse_id(id)?)),
                None => match request.query.as_deref().map(str::trim) {
                    Some(query) if !query.is_empty() => Ok(Operation::Search(query.to_string())),
                    _ => Ok(Operation::List),
                },
            },
            Method::Post => Ok(Operation::Create(parse_body(request)?)),
            Method::Put => {
                let id = required_id(request)?;
                Ok(Operation::Update(id, parse_body(request)?))
            }
            Method::Delete => Ok(Operation::Delete(required_id(request)?)),
        }
    }
}

/// A request routed to its resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Items {
        item_type: ItemType,
        op: Operation<ItemInput>,
    },
    Categories(Operation<CategoryInput>),
    Suppliers(Operation<SupplierInput>),
    Visits(Operation<VisitInput>),
}

impl Command {
    pub fn parse(request: &Request) -> ApiResult<Self> {
        let resource = Resource::parse(&request.resource)
            .ok_or_else(|| ApiError::UnknownResource(request.resource.clone()))?;
        let method = Method::parse(&request.method)
            .ok_or_else(|| ApiError::MethodNotAllowed(request.method.clone()))?;

        Ok(match resource {
            Resource::Medicine => Command::Items {
                item_type: ItemType::Medicine,
                op: Operation::parse(method, request)?,
            },
            Resource::Supply => Command::Items {
                item_type: ItemType::Supply,
                op: Operation::parse(method, request)?,
            },
            Resource::Category => Command::Categories(Operation::parse(method, request)?),
            Resource::Supplier => Command::Suppliers(Operation::parse(method, request)?),
            Resource::Visit => Command::Visits(Operation::parse(method, request)?),
        })
    }
}

/// Parse a positive integer id from a number or numeric string.
pub fn parse_id(value: &Value) -> ApiResult<i64> {
    let id = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match id {
        Some(id) if id > 0 => Ok(id),
        _ => Err(ApiError::Invalid(format!(
            "id must be a positive integer, got {}",
            value
        ))),
    }
}

fn required_id(request: &Request) -> ApiResult<i64> {
    match &request.id {
        Some(id) => parse_id(id),
        None => Err(ApiError::Invalid("id is required".into())),
    }
}

fn parse_body<B: BodyInput>(request: &Request) -> ApiResult<B> {
    let body = request
        .body
        .clone()
        .ok_or_else(|| ApiError::Invalid("request body is required".into()))?;
    let input: B = serde_json::from_value(body)
        .map_err(|e| ApiError::Invalid(format!("malformed request body: {}", e)))?;
    input.validate()?;
    Ok(input)
}

/// A request body that can check itself before reaching storage.
pub trait BodyInput: DeserializeOwned {
    fn validate(&self) -> ApiResult<()>;
}

fn require_name(name: &str) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(ApiError::Invalid("name is required".into()));
    }
    Ok(())
}

// =========================================================================
// Bodies
// =========================================================================

/// Medicine or supply fields; the type comes from the resource.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemInput {
    #[serde(default)]
    pub name: String,
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
    /// Opening balance on create, target level on update
    pub stock: Option<i64>,
    pub unit: Option<String>,
    pub reorder_level: Option<i64>,
}

impl BodyInput for ItemInput {
    fn validate(&self) -> ApiResult<()> {
        require_name(&self.name)?;
        if matches!(self.stock, Some(s) if s < 0) {
            return Err(ApiError::Invalid("stock must not be negative".into()));
        }
        if matches!(self.reorder_level, Some(r) if r < 0) {
            return Err(ApiError::Invalid("reorderLevel must not be negative".into()));
        }
        Ok(())
    }
}

impl ItemInput {
    pub fn into_item(self, item_type: ItemType) -> InventoryItem {
        let mut item = InventoryItem::new(self.name.trim(), item_type);
        item.category_id = self.category_id;
        item.supplier_id = self.supplier_id;
        item.stock = self.stock.unwrap_or(0);
        if let Some(unit) = self.unit.filter(|u| !u.trim().is_empty()) {
            item.unit = unit;
        }
        item.reorder_level = self.reorder_level.unwrap_or(0);
        item
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    #[serde(default)]
    pub name: String,
    pub item_type: Option<String>,
}

impl BodyInput for CategoryInput {
    fn validate(&self) -> ApiResult<()> {
        require_name(&self.name)?;
        self.parsed_type().map(|_| ())
    }
}

impl CategoryInput {
    fn parsed_type(&self) -> ApiResult<ItemType> {
        let raw = self
            .item_type
            .as_deref()
            .ok_or_else(|| ApiError::Invalid("itemType is required".into()))?;
        ItemType::parse(raw).ok_or_else(|| {
            ApiError::Invalid(format!(
                "itemType must be 'medicine' or 'supply', got '{}'",
                raw
            ))
        })
    }

    pub fn into_category(self, id: Option<i64>) -> ApiResult<Category> {
        let item_type = self.parsed_type()?;
        let mut category = Category::new(self.name.trim(), item_type);
        category.id = id;
        Ok(category)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SupplierInput {
    #[serde(default)]
    pub name: String,
    pub contact: Option<String>,
}

impl BodyInput for SupplierInput {
    fn validate(&self) -> ApiResult<()> {
        require_name(&self.name)
    }
}

impl SupplierInput {
    pub fn into_supplier(self, id: Option<i64>) -> Supplier {
        let mut supplier = Supplier::new(self.name.trim());
        supplier.id = id;
        supplier.contact = self.contact;
        supplier
    }
}

/// A dispensed line as entered: item name and quantity.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LineInput {
    #[serde(default)]
    pub name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitInput {
    /// Who was seen; `name` is accepted as an alias
    #[serde(default, alias = "name")]
    pub subject: String,
    pub visited_at: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub medicines: Vec<LineInput>,
    #[serde(default)]
    pub supplies: Vec<LineInput>,
}

impl BodyInput for VisitInput {
    fn validate(&self) -> ApiResult<()> {
        require_name(&self.subject)?;
        if let Some(at) = &self.visited_at {
            if chrono::DateTime::parse_from_rfc3339(at).is_err() {
                return Err(ApiError::Invalid(format!(
                    "visitedAt is not an RFC 3339 timestamp: {}",
                    at
                )));
            }
        }
        for line in self.medicines.iter().chain(&self.supplies) {
            if line.name.trim().is_empty() {
                return Err(ApiError::Invalid("dispensed item name is required".into()));
            }
            if line.quantity <= 0 {
                return Err(ApiError::Invalid(format!(
                    "quantity for '{}' must be positive",
                    line.name
                )));
            }
        }
        Ok(())
    }
}

impl VisitInput {
    /// Build an unsaved visit with its dispensed lines.
    pub fn into_visit(self, recorded_by: &str) -> ClinicVisit {
        let mut visit = ClinicVisit::new(self.subject.trim(), recorded_by);
        if let Some(at) = self.visited_at {
            visit.visited_at = at;
        }
        visit.notes = self.notes;

        let medicines = self
            .medicines
            .into_iter()
            .map(|l| DispensedItem::new(l.name.trim(), ItemType::Medicine, l.quantity));
        let supplies = self
            .supplies
            .into_iter()
            .map(|l| DispensedItem::new(l.name.trim(), ItemType::Supply, l.quantity));
        visit.dispensed = medicines.chain(supplies).collect();
        visit
    }
}
