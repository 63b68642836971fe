//! Balance call types
//!
//! A `Call` is the unit of work submitted to the Account Balance Manager of
//! one shard; every call is answered by exactly one `CallResult`.

use super::account::{AccountId, ReservationStatus};
use super::error::CallError;
use super::transaction::TransactionId;
use rust_decimal::Decimal;
use std::fmt;

/// Call identifier, unique per submitted call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(uuid::Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Balance operations a shard manager executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    /// Balance minus the sum of `Ok` reservations
    GetAvailableBalance,
    /// Set money aside for a transaction (idempotent per transaction)
    ReserveAmount,
    /// Take a reserved amount from the balance
    DebitReservedAmount,
    /// Release a reservation without touching the balance
    CancelReservedAmount,
    /// Increase the balance (deduplicated per transaction)
    AddAmount,
    /// Read the reservation status for a transaction
    GetReservationStatus,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallType::GetAvailableBalance => "GET_AVAILABLE_BALANCE",
            CallType::ReserveAmount => "RESERVE_AMOUNT",
            CallType::DebitReservedAmount => "DEBIT_RESERVED_AMOUNT",
            CallType::CancelReservedAmount => "CANCEL_RESERVED_AMOUNT",
            CallType::AddAmount => "ADD_AMOUNT",
            CallType::GetReservationStatus => "GET_RESERVATION_STATUS",
        };
        f.write_str(name)
    }
}

/// A request routed to the shard owning `account_id`
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub id: CallId,
    pub call_type: CallType,
    pub account_id: AccountId,
    pub transaction_id: Option<TransactionId>,
    pub amount: Option<Decimal>,
}

impl Call {
    fn build(
        call_type: CallType,
        account_id: impl Into<AccountId>,
        transaction_id: Option<TransactionId>,
        amount: Option<Decimal>,
    ) -> Self {
        Call {
            id: CallId::new(),
            call_type,
            account_id: account_id.into(),
            transaction_id,
            amount,
        }
    }

    pub fn get_available_balance(account_id: impl Into<AccountId>) -> Self {
        Self::build(CallType::GetAvailableBalance, account_id, None, None)
    }

    pub fn reserve_amount(
        account_id: impl Into<AccountId>,
        transaction_id: TransactionId,
        amount: Decimal,
    ) -> Self {
        Self::build(
            CallType::ReserveAmount,
            account_id,
            Some(transaction_id),
            Some(amount),
        )
    }

    pub fn debit_reserved_amount(
        account_id: impl Into<AccountId>,
        transaction_id: TransactionId,
    ) -> Self {
        Self::build(
            CallType::DebitReservedAmount,
            account_id,
            Some(transaction_id),
            None,
        )
    }

    pub fn cancel_reserved_amount(
        account_id: impl Into<AccountId>,
        transaction_id: TransactionId,
    ) -> Self {
        Self::build(
            CallType::CancelReservedAmount,
            account_id,
            Some(transaction_id),
            None,
        )
    }

    /// Credit without a transaction id is applied unconditionally
    pub fn add_amount(
        account_id: impl Into<AccountId>,
        transaction_id: Option<TransactionId>,
        amount: Decimal,
    ) -> Self {
        Self::build(CallType::AddAmount, account_id, transaction_id, Some(amount))
    }

    pub fn get_reservation_status(
        account_id: impl Into<AccountId>,
        transaction_id: TransactionId,
    ) -> Self {
        Self::build(
            CallType::GetReservationStatus,
            account_id,
            Some(transaction_id),
            None,
        )
    }
}

/// Successful payload of a call
#[derive(Debug, Clone, PartialEq)]
pub enum CallValue {
    /// Available balance
    Amount(Decimal),
    /// Reservation status, with a human-readable reason when denied
    Reservation {
        status: ReservationStatus,
        reason: Option<String>,
    },
    /// Mutation applied (debit, cancel, credit)
    Completed,
}

/// The single answer posted for a call
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub call_id: CallId,
    pub outcome: Result<CallValue, CallError>,
}

impl CallResult {
    pub fn success(call_id: CallId, value: CallValue) -> Self {
        CallResult {
            call_id,
            outcome: Ok(value),
        }
    }

    pub fn failure(call_id: CallId, error: CallError) -> Self {
        CallResult {
            call_id,
            outcome: Err(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Expect an available balance
    pub fn into_amount(self) -> Result<Decimal, CallError> {
        match self.outcome? {
            CallValue::Amount(amount) => Ok(amount),
            other => Err(CallError::unexpected_result(self.call_id, &other)),
        }
    }

    /// Expect a reservation status
    pub fn into_reservation(self) -> Result<(ReservationStatus, Option<String>), CallError> {
        match self.outcome? {
            CallValue::Reservation { status, reason } => Ok((status, reason)),
            other => Err(CallError::unexpected_result(self.call_id, &other)),
        }
    }

    /// Expect a completed mutation
    pub fn into_completed(self) -> Result<(), CallError> {
        match self.outcome? {
            CallValue::Completed => Ok(()),
            other => Err(CallError::unexpected_result(self.call_id, &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_fields() {
        let tx = TransactionId::new();
        let amount = Decimal::new(500, 2);

        let reserve = Call::reserve_amount("a", tx, amount);
        assert_eq!(reserve.call_type, CallType::ReserveAmount);
        assert_eq!(reserve.account_id, "a");
        assert_eq!(reserve.transaction_id, Some(tx));
        assert_eq!(reserve.amount, Some(amount));

        let balance = Call::get_available_balance("a");
        assert_eq!(balance.transaction_id, None);
        assert_eq!(balance.amount, None);

        let debit = Call::debit_reserved_amount("a", tx);
        assert_eq!(debit.amount, None);
    }

    #[test]
    fn test_each_call_gets_a_unique_id() {
        let first = Call::get_available_balance("a");
        let second = Call::get_available_balance("a");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_result_accessors() {
        let id = CallId::new();
        let result = CallResult::success(id, CallValue::Amount(Decimal::TEN));
        assert_eq!(result.into_amount(), Ok(Decimal::TEN));

        let result = CallResult::success(id, CallValue::Completed);
        assert!(matches!(
            result.into_amount(),
            Err(CallError::UnexpectedResult { .. })
        ));

        let result = CallResult::failure(id, CallError::execution(id, "boom"));
        assert!(result.is_error());
        assert!(result.into_completed().is_err());
    }
}
