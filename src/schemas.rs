use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

fn default_room_status() -> String {
    "available".to_string()
}
fn default_bill_status() -> String {
    "unpaid".to_string()
}
fn default_bill_kind() -> String {
    "monthly_rent".to_string()
}
fn default_tenant_role() -> String {
    "tenant".to_string()
}
fn default_true() -> bool {
    true
}
fn default_zero_i64() -> i64 {
    0
}
fn default_limit_100() -> i64 {
    100
}
fn default_sort_by_created_at() -> String {
    "created_at".to_string()
}
fn default_sort_order_desc() -> String {
    "desc".to_string()
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct LoginInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateRoomInput {
    #[validate(length(min = 1, max = 50))]
    pub number: String,
    pub floor: Option<i64>,
    #[validate(range(min = 0))]
    pub monthly_price: i64,
    #[serde(default = "default_room_status")]
    pub status: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateRoomInput {
    pub number: Option<String>,
    pub floor: Option<i64>,
    pub monthly_price: Option<i64>,
    pub status: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateTenantInput {
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub id_card_number: Option<String>,
    pub room_id: Option<String>,
    pub move_in_date: String,
    pub move_out_date: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateTenantInput {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub id_card_number: Option<String>,
    pub room_id: Option<String>,
    pub move_in_date: Option<String>,
    pub move_out_date: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateBillInput {
    pub tenant_id: String,
    pub room_id: Option<String>,
    #[validate(length(equal = 7))]
    pub month: String,
    #[validate(range(min = 0))]
    pub amount_charged: i64,
    #[serde(default = "default_zero_i64")]
    pub amount_paid: i64,
    #[serde(default = "default_bill_status")]
    pub status: String,
    #[serde(default = "default_bill_kind")]
    pub kind: String,
    pub payment_date: Option<String>,
    pub received_by: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateBillInput {
    pub room_id: Option<String>,
    pub month: Option<String>,
    pub amount_charged: Option<i64>,
    pub amount_paid: Option<i64>,
    pub status: Option<String>,
    pub payment_date: Option<String>,
    pub received_by: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct GenerateBillsInput {
    #[validate(length(equal = 7))]
    pub month: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PaymentUpdateInput {
    pub status: String,
    pub amount_paid: i64,
    pub payment_date: Option<String>,
    pub received_by: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateTransactionInput {
    #[validate(length(min = 1, max = 32))]
    pub kind: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[validate(range(min = 0))]
    pub amount: i64,
    pub transaction_date: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateTransactionInput {
    pub kind: Option<String>,
    pub category: Option<String>,
    pub amount: Option<i64>,
    pub transaction_date: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[serde(default = "default_tenant_role")]
    pub role: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateUserInput {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

// serde_urlencoded cannot deserialize flattened structs with numeric
// fields, so every query struct carries its own paging fields.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ListQuery {
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_sort_by_created_at")]
    pub sort_by: String,
    #[serde(default = "default_sort_order_desc")]
    pub sort_order: String,
}

impl ListQuery {
    pub fn ascending(&self) -> bool {
        self.sort_order.eq_ignore_ascii_case("asc")
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct RoomsQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_sort_by_created_at")]
    pub sort_by: String,
    #[serde(default = "default_sort_order_desc")]
    pub sort_order: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TenantsQuery {
    pub is_active: Option<bool>,
    pub room_id: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_sort_by_created_at")]
    pub sort_by: String,
    #[serde(default = "default_sort_order_desc")]
    pub sort_order: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct BillsQuery {
    pub month: Option<String>,
    pub status: Option<String>,
    pub tenant_id: Option<String>,
    pub kind: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_sort_by_created_at")]
    pub sort_by: String,
    #[serde(default = "default_sort_order_desc")]
    pub sort_order: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TenantBillsQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TransactionsQuery {
    pub kind: Option<String>,
    pub category: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_sort_by_created_at")]
    pub sort_by: String,
    #[serde(default = "default_sort_order_desc")]
    pub sort_order: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct NotificationsQuery {
    pub is_read: Option<bool>,
    pub tenant_id: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_sort_by_created_at")]
    pub sort_by: String,
    #[serde(default = "default_sort_order_desc")]
    pub sort_order: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct DateRangeQuery {
    pub date_from: String,
    pub date_to: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct CashFlowQuery {
    pub months_ahead: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct RoomPath {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TenantPath {
    pub tenant_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct BillPath {
    pub bill_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TransactionPath {
    pub transaction_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UserPath {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct NotificationPath {
    pub notification_id: String,
}

pub fn sort_ascending(sort_order: &str) -> bool {
    sort_order.eq_ignore_ascii_case("asc")
}

pub fn clamp_limit_in_range(limit: i64, minimum: i64, maximum: i64) -> i64 {
    limit.clamp(minimum, maximum)
}

pub fn serialize_to_map<T>(value: &T) -> serde_json::Map<String, serde_json::Value>
where
    T: serde::Serialize,
{
    let json = serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|_, value| !value.is_null());
    map
}

#[cfg(test)]
mod tests {
    use super::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreateRoomInput,
        GenerateBillsInput, ListQuery, PaymentUpdateInput,
    };

    #[test]
    fn rejects_out_of_range_input() {
        let room = CreateRoomInput {
            number: String::new(),
            floor: None,
            monthly_price: -1,
            status: "available".to_string(),
            description: None,
        };
        assert!(validate_input(&room).is_err());

        let bills: GenerateBillsInput = serde_json::from_value(serde_json::json!({
            "month": "2025-1"
        }))
        .expect("deserializes");
        assert!(validate_input(&bills).is_err());
    }

    #[test]
    fn serializes_and_strips_nulls() {
        let room = CreateRoomInput {
            number: "A1".to_string(),
            floor: None,
            monthly_price: 500_000,
            status: "available".to_string(),
            description: None,
        };
        let map = remove_nulls(serialize_to_map(&room));
        assert_eq!(map.get("number"), Some(&serde_json::json!("A1")));
        assert!(!map.contains_key("floor"));
        assert!(!map.contains_key("description"));
    }

    #[test]
    fn paid_update_keeps_receiver_and_payment_date() {
        let payment = PaymentUpdateInput {
            status: "paid".to_string(),
            amount_paid: 500_000,
            payment_date: Some("2025-01-28".to_string()),
            received_by: Some("manager".to_string()),
            note: None,
        };
        let map = remove_nulls(serialize_to_map(&payment));
        assert_eq!(map.get("received_by"), Some(&serde_json::json!("manager")));
        assert_eq!(
            map.get("payment_date"),
            Some(&serde_json::json!("2025-01-28"))
        );
        assert!(!map.contains_key("note"));
    }

    #[test]
    fn list_query_defaults_and_clamping() {
        let query: ListQuery = serde_json::from_value(serde_json::json!({})).expect("defaults");
        assert_eq!(query.limit, 100);
        assert_eq!(query.offset, 0);
        assert!(!query.ascending());
        assert_eq!(clamp_limit_in_range(9_999, 1, 500), 500);
        assert_eq!(clamp_limit_in_range(0, 1, 500), 1);
    }
}
