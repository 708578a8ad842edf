//! Multi-step checkout flow.
//!
//! ```text
//! Shipping -> Payment -> Review -> Complete
//! ```
//!
//! `Complete` is terminal. Moving back is allowed from `Payment` and `Review`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Cart;

/// A step in the checkout flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    #[default]
    Shipping,
    Payment,
    Review,
    Complete,
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shipping => write!(f, "shipping"),
            Self::Payment => write!(f, "payment"),
            Self::Review => write!(f, "review"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Errors raised by the checkout flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Checkout cannot start with an empty cart.
    #[error("cannot check out an empty cart")]
    EmptyCart,

    /// The requested move is not allowed from the current step.
    #[error("cannot {action} from the {from} step")]
    InvalidTransition {
        from: CheckoutStep,
        action: &'static str,
    },
}

/// Checkout progress for one cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Checkout {
    step: CheckoutStep,
}

impl Checkout {
    /// Start checkout for `cart`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` if the cart has no lines.
    pub fn start(cart: &Cart) -> Result<Self, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        Ok(Self::default())
    }

    #[must_use]
    pub const fn step(&self) -> CheckoutStep {
        self.step
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.step, CheckoutStep::Complete)
    }

    /// Move to the next step.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidTransition` if checkout is complete.
    pub const fn advance(&mut self) -> Result<CheckoutStep, CheckoutError> {
        self.step = match self.step {
            CheckoutStep::Shipping => CheckoutStep::Payment,
            CheckoutStep::Payment => CheckoutStep::Review,
            CheckoutStep::Review => CheckoutStep::Complete,
            CheckoutStep::Complete => {
                return Err(CheckoutError::InvalidTransition {
                    from: CheckoutStep::Complete,
                    action: "advance",
                });
            }
        };
        Ok(self.step)
    }

    /// Move to the previous step.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidTransition` from `Shipping` or `Complete`.
    pub const fn back(&mut self) -> Result<CheckoutStep, CheckoutError> {
        self.step = match self.step {
            CheckoutStep::Payment => CheckoutStep::Shipping,
            CheckoutStep::Review => CheckoutStep::Payment,
            from @ (CheckoutStep::Shipping | CheckoutStep::Complete) => {
                return Err(CheckoutError::InvalidTransition {
                    from,
                    action: "go back",
                });
            }
        };
        Ok(self.step)
    }
}
