//! Expense splitting
//!
//! Every member of a group, the payer included, consumes an equal share of
//! an expense. The payer's own share is forgiven by having paid; every other
//! member ends up owing the payer one share.

use crate::balance::BalanceService;
use crate::error::{Error, Result};
use crate::groups::resolve_members;
use crate::storage::GroupStore;
use crate::types::{Amount, ExpenseSplit, GroupId, UserId, MAX_AMOUNT};
use std::sync::Arc;
use tracing::{debug, info};

/// Minimum number of members (owner included) an expense can be split across
pub const MIN_MEMBERS: usize = 2;

/// Per-member share of `total`, rounded half away from zero
///
/// Amounts are integer minor units, so the division rounds instead of
/// truncating. Debtors owe exactly the share; the payer absorbs whatever
/// remainder the rounding leaves.
pub fn split_share(total: Amount, members: usize) -> Amount {
    debug_assert!(members > 0);
    let members = members as i128;
    let total = total as i128;

    let half = members / 2;
    let share = if total >= 0 {
        (total + half) / members
    } else {
        (total - half) / members
    };

    // |share| <= |total|, so this never truncates
    share as Amount
}

/// Splits group expenses into ledger loans
pub struct ExpenseSplitter {
    groups: Arc<dyn GroupStore>,
    balances: Arc<BalanceService>,
}

impl std::fmt::Debug for ExpenseSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpenseSplitter")
            .field("balances", &self.balances)
            .finish_non_exhaustive()
    }
}

impl ExpenseSplitter {
    /// Create a splitter over a group directory and a balance service
    pub fn new(groups: Arc<dyn GroupStore>, balances: Arc<BalanceService>) -> Self {
        Self { groups, balances }
    }

    /// Share an expense of `total` paid by `payer` across `group`
    ///
    /// Fails with `NotFound` for an unknown group, `BadRequest` for a group
    /// with fewer than two members or an amount that cannot be split, and
    /// `Forbidden` when the payer is not a member. Either every debtor's loan
    /// is recorded or none is.
    pub async fn share_expense(&self, payer: UserId, total: Amount, group: GroupId) -> Result<ExpenseSplit> {
        if total <= 0 {
            return Err(Error::BadRequest(format!(
                "expense amount must be positive, got {}",
                total
            )));
        }

        if total > MAX_AMOUNT {
            return Err(Error::BadRequest(format!(
                "expense amount {} exceeds the maximum of {}",
                total, MAX_AMOUNT
            )));
        }

        let members = resolve_members(self.groups.as_ref(), group).await?;

        if members.len() < MIN_MEMBERS {
            return Err(Error::BadRequest("group is empty".to_string()));
        }

        // Everyone except the payer becomes a debtor
        let debtors: Vec<UserId> = members.iter().copied().filter(|m| *m != payer).collect();
        if debtors.len() == members.len() {
            return Err(Error::Forbidden(
                "user is not a member of the group".to_string(),
            ));
        }

        let share = split_share(total, members.len());
        if share <= 0 {
            return Err(Error::BadRequest(format!(
                "expense of {} is too small to split between {} members",
                total,
                members.len()
            )));
        }

        debug!(
            group_id = %group,
            payer_id = %payer,
            amount_total = total,
            amount_per_user = share,
            debtors = debtors.len(),
            "Sharing expense"
        );

        let loans = self.balances.add_loan(payer, share, &debtors).await?;

        info!(group_id = %group, payer_id = %payer, amount_total = total, "Expense shared");

        Ok(ExpenseSplit {
            group_id: group,
            payer_id: payer,
            total_amount: total,
            share,
            debtors,
            loans,
        })
    }
}
