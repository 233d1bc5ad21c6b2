use ledger_core::groups::{MAX_NAME_LEN, MIN_NAME_LEN};
use ledger_core::{BalanceEntry, Group, UserId, MAX_AMOUNT};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Create group request
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = "MIN_NAME_LEN", max = "MAX_NAME_LEN"))]
    pub name: String,
}

/// Add members request
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct AddMembersRequest {
    #[validate(length(min = 1))]
    pub ids: Vec<UserId>,
}

/// Share expense request; amount in minor units
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ShareExpenseRequest {
    #[validate(range(min = 1, max = "MAX_AMOUNT"))]
    pub amount: i64, // ledger_core::Amount; validator derive needs the primitive name
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub balance: Vec<BalanceEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupsResponse {
    pub groups: Vec<Group>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembersResponse {
    pub members: Vec<UserId>,
}
