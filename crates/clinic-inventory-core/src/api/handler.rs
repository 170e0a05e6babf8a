//! Dispatch of parsed commands onto the store and the coordinator.

use tracing::{error, info_span, warn};
use uuid::Uuid;

use super::{
    ApiError, ApiResult, CategoryInput, Command, ItemInput, Operation, Request, Response,
    SupplierInput, VisitInput,
};
use crate::coordinator::Coordinator;
use crate::db::{Categories, Database, DbError, Inventory, Suppliers, VisitLedger};
use crate::models::{ClinicVisit, InventoryItem, ItemType};

/// Serves requests against one database connection.
pub struct Handler<'a> {
    db: &'a mut Database,
    default_actor: String,
}

impl<'a> Handler<'a> {
    pub fn new(db: &'a mut Database, default_actor: impl Into<String>) -> Self {
        Self {
            db,
            default_actor: default_actor.into(),
        }
    }

    /// Handle one request. Never fails: every error becomes a response.
    pub fn handle(&mut self, request: Request) -> Response {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "request",
            %request_id,
            method = %request.method,
            resource = %request.resource
        );
        let _guard = span.enter();

        match self.dispatch(&request) {
            Ok(response) => response,
            Err(err) => {
                if err.is_internal() {
                    error!(error = %err, "request failed");
                } else {
                    warn!(status = err.status(), error = %err, "request rejected");
                }
                Response::from(&err)
            }
        }
    }

    fn dispatch(&mut self, request: &Request) -> ApiResult<Response> {
        let command = Command::parse(request)?;
        let actor = request
            .actor
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.default_actor)
            .to_string();

        match command {
            Command::Items { item_type, op } => self.items(item_type, op, &actor),
            Command::Categories(op) => self.categories(op),
            Command::Suppliers(op) => self.suppliers(op),
            Command::Visits(op) => self.visits(op, &actor),
        }
    }

    fn items(
        &mut self,
        item_type: ItemType,
        op: Operation<ItemInput>,
        actor: &str,
    ) -> ApiResult<Response> {
        match op {
            Operation::List => {
                let items = Inventory::new(self.db.conn()).list(Some(item_type))?;
                Ok(Response::ok(&items))
            }
            Operation::Search(query) => {
                let items = Inventory::new(self.db.conn()).search(&query, Some(item_type))?;
                Ok(Response::ok(&items))
            }
            Operation::Get(id) => Ok(Response::ok(&self.item_of_type(id, item_type)?)),
            Operation::Create(input) => {
                let item = input.into_item(item_type);
                let saved = Coordinator::new(self.db).save_item(&item, actor)?;
                Ok(Response::created(&saved))
            }
            Operation::Update(id, input) => {
                let current = self.item_of_type(id, item_type)?;
                let stock = input.stock;
                let mut item = input.into_item(item_type);
                item.id = Some(id);
                item.created_at = current.created_at;

                let mut coordinator = Coordinator::new(self.db);
                let saved = match stock {
                    Some(stock) => {
                        item.stock = stock;
                        coordinator.save_item(&item, actor)?
                    }
                    None => coordinator.update_item_details(&item)?,
                };
                Ok(Response::ok(&saved))
            }
            Operation::Delete(id) => {
                self.item_of_type(id, item_type)?;
                Coordinator::new(self.db).delete_item(id)?;
                Ok(Response::done::<InventoryItem>(
                    format!("{} #{} deleted", item_type.as_str(), id),
                    None,
                ))
            }
        }
    }

    /// Load an item, treating an item of the other type as absent.
    fn item_of_type(&self, id: i64, item_type: ItemType) -> ApiResult<InventoryItem> {
        Inventory::new(self.db.conn())
            .get(id)?
            .filter(|item| item.item_type == item_type)
            .ok_or_else(|| not_found(format!("{} #{}", item_type.as_str(), id)))
    }

    fn categories(&mut self, op: Operation<CategoryInput>) -> ApiResult<Response> {
        match op {
            Operation::List => Ok(Response::ok(&Categories::new(self.db.conn()).list(None)?)),
            Operation::Search(query) => {
                Ok(Response::ok(&Categories::new(self.db.conn()).search(&query)?))
            }
            Operation::Get(id) => {
                let category = Categories::new(self.db.conn())
                    .get(id)?
                    .ok_or_else(|| not_found(format!("category #{}", id)))?;
                Ok(Response::ok(&category))
            }
            Operation::Create(input) => {
                let category = input.into_category(None)?;
                let saved = Coordinator::new(self.db).save_category(&category)?;
                Ok(Response::created(&saved))
            }
            Operation::Update(id, input) => {
                let category = input.into_category(Some(id))?;
                let saved = Coordinator::new(self.db).save_category(&category)?;
                Ok(Response::ok(&saved))
            }
            Operation::Delete(id) => {
                Coordinator::new(self.db).delete_category(id)?;
                Ok(Response::done::<()>(format!("category #{} deleted", id), None))
            }
        }
    }

    fn suppliers(&mut self, op: Operation<SupplierInput>) -> ApiResult<Response> {
        match op {
            Operation::List => Ok(Response::ok(&Suppliers::new(self.db.conn()).list()?)),
            Operation::Search(query) => {
                Ok(Response::ok(&Suppliers::new(self.db.conn()).search(&query)?))
            }
            Operation::Get(id) => {
                let supplier = Suppliers::new(self.db.conn())
                    .get(id)?
                    .ok_or_else(|| not_found(format!("supplier #{}", id)))?;
                Ok(Response::ok(&supplier))
            }
            Operation::Create(input) => {
                let saved = Coordinator::new(self.db).save_supplier(&input.into_supplier(None))?;
                Ok(Response::created(&saved))
            }
            Operation::Update(id, input) => {
                let saved =
                    Coordinator::new(self.db).save_supplier(&input.into_supplier(Some(id)))?;
                Ok(Response::ok(&saved))
            }
            Operation::Delete(id) => {
                Coordinator::new(self.db).delete_supplier(id)?;
                Ok(Response::done::<()>(format!("supplier #{} deleted", id), None))
            }
        }
    }

    fn visits(&mut self, op: Operation<VisitInput>, actor: &str) -> ApiResult<Response> {
        match op {
            Operation::List => Ok(Response::ok(&VisitLedger::new(self.db.conn()).list()?)),
            Operation::Search(query) => {
                Ok(Response::ok(&VisitLedger::new(self.db.conn()).search(&query)?))
            }
            Operation::Get(id) => Ok(Response::ok(&self.visit(id)?)),
            Operation::Create(input) => {
                let visit = input.into_visit(actor);
                let saved = Coordinator::new(self.db).create_visit(&visit, actor)?;
                Ok(Response::created(&saved))
            }
            Operation::Update(id, input) => {
                // Dispensed lines are fixed once recorded; only the header changes.
                let current = self.visit(id)?;
                let visited_at = input.visited_at.clone();
                let mut visit = input.into_visit(&current.recorded_by);
                visit.id = Some(id);
                visit.visited_at = visited_at.unwrap_or(current.visited_at);
                visit.created_at = current.created_at;
                visit.dispensed.clear();

                let saved = Coordinator::new(self.db).update_visit(&visit)?;
                Ok(Response::ok(&saved))
            }
            Operation::Delete(id) => {
                let outcome = Coordinator::new(self.db).delete_visit(id, actor)?;
                Ok(Response::done(format!("visit #{} deleted", id), Some(&outcome)))
            }
        }
    }

    fn visit(&self, id: i64) -> ApiResult<ClinicVisit> {
        VisitLedger::new(self.db.conn())
            .get(id)?
            .ok_or_else(|| not_found(format!("visit #{}", id)))
    }
}

fn not_found(what: String) -> ApiError {
    ApiError::Db(DbError::NotFound(what))
}
