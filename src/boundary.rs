//! Request and response shapes for a transport layer sitting on top of
//! [`LoanLifecycleService`], plus the mapping of [`LoanError`] onto response
//! classes and stable user-facing messages.
use super::error::LoanError;
use super::identity::IdentityLookup;
use super::loan::{Evidence, LoanState};
use super::service::LoanLifecycleService;
use super::store::LoanLedgerStore;
use super::types::{ActorId, BorrowerId, InvestmentId, InvestorId, LoanId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Response category of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    InvalidRequest,
    Internal,
}

impl ErrorClass {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorClass::NotFound => 404,
            ErrorClass::InvalidRequest => 400,
            ErrorClass::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::NotFound => "NOT_FOUND",
            ErrorClass::InvalidRequest => "BAD_REQUEST",
            ErrorClass::Internal => "INTERNAL_ERROR",
        }
    }
}

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}

impl LoanError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LoanError::BorrowerNotFound
            | LoanError::LoanNotFound
            | LoanError::InvestorNotFound
            | LoanError::InvestmentNotFound => ErrorClass::NotFound,
            LoanError::LoanStateInvalid(_)
            | LoanError::LoanStateTransitionNotAllowed { .. }
            | LoanError::StateTransitionRequirementNotFulfilled(_)
            | LoanError::LoanMustBePublished
            | LoanError::InvestmentAlreadyExists
            | LoanError::InvalidAmount
            | LoanError::EvidenceNotAccepted { .. } => ErrorClass::InvalidRequest,
            LoanError::Storage(_) => ErrorClass::Internal,
        }
    }

    /// Message safe to show to an end user. Does not vary with the error's
    /// payload.
    pub fn user_message(&self) -> &'static str {
        match self {
            LoanError::BorrowerNotFound => "borrower is not found",
            LoanError::LoanNotFound => "loan is not found",
            LoanError::InvestorNotFound => "investor is not found",
            LoanError::InvestmentNotFound => "investment is not found",
            LoanError::LoanStateInvalid(_) => "loan state invalid",
            LoanError::LoanStateTransitionNotAllowed { .. } => {
                "loan state transition is not allowed"
            }
            LoanError::StateTransitionRequirementNotFulfilled(_) => {
                "loan state transition requirement is not fulfilled"
            }
            LoanError::LoanMustBePublished => "loan state must be published",
            LoanError::InvestmentAlreadyExists => "investment already exists",
            LoanError::InvalidAmount => "amount must be greater than zero",
            LoanError::EvidenceNotAccepted { .. } => "evidence is not accepted for the loan state",
            LoanError::Storage(_) => "Something wrong in the system!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub detail: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub message: String,
}

/// Envelope for every response, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericResponse<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> GenericResponse<T> {
    pub fn ok(result: Option<T>) -> Self {
        Self {
            code: 200,
            message: status_text(200).to_string(),
            result,
            error: None,
        }
    }

    pub fn invalid(detail: impl Into<String>, message: impl Into<String>) -> Self {
        Self::failure(ErrorClass::InvalidRequest, detail.into(), message.into())
    }

    fn failure(class: ErrorClass, detail: String, message: String) -> Self {
        let code = class.status_code();
        Self {
            code,
            message: status_text(code).to_string(),
            result: None,
            error: Some(ErrorBody { detail, message }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl<T> From<LoanError> for GenericResponse<T> {
    fn from(err: LoanError) -> Self {
        let class = err.class();
        let detail = err.to_string();

        match class {
            ErrorClass::Internal => {
                tracing::error!(error = %detail, code = class.as_str(), "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %detail, code = class.as_str(), "Client error occurred");
            }
        }

        Self::failure(class, detail, err.user_message().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoanRequest {
    #[serde(rename = "borrowerID")]
    pub borrower_id: String,
    #[serde(rename = "principalAmount")]
    pub principal_amount: u64,
    #[serde(rename = "interestRate")]
    pub interest_rate: u32,
    #[serde(rename = "roiRate")]
    pub roi_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoanResponse {
    #[serde(rename = "loanID")]
    pub loan_id: LoanId,
    pub state: LoanState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLoanStateRequest {
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoanInvestmentRequest {
    #[serde(rename = "investorID")]
    pub investor_id: String,
    #[serde(rename = "investmentAmount")]
    pub investment_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoanInvestmentResponse {
    #[serde(rename = "investmentID")]
    pub investment_id: InvestmentId,
}

/// Decode a JSON request body, answering with a bad-request response on
/// malformed input.
pub fn decode_request<R, T>(body: &str) -> Result<R, GenericResponse<T>>
where
    R: DeserializeOwned,
{
    serde_json::from_str(body)
        .map_err(|err| GenericResponse::invalid(err.to_string(), "Request body invalid"))
}

fn required<T>(value: &str, message: &str) -> Result<(), GenericResponse<T>> {
    if value.trim().is_empty() {
        return Err(GenericResponse::invalid(
            format!("{} is required", message),
            message.to_string() + " invalid",
        ));
    }
    Ok(())
}

/// Translates typed requests into lifecycle operations and their outcome
/// into [`GenericResponse`]s.
pub struct LoanDesk<'a, S, I> {
    service: &'a LoanLifecycleService<S, I>,
}

impl<'a, S, I> LoanDesk<'a, S, I>
where
    S: LoanLedgerStore,
    I: IdentityLookup,
{
    pub fn new(service: &'a LoanLifecycleService<S, I>) -> Self {
        Self { service }
    }

    pub fn create_loan(
        &self,
        request: &CreateLoanRequest,
        actor: &ActorId,
    ) -> GenericResponse<CreateLoanResponse> {
        if let Err(response) = required(&request.borrower_id, "Borrower ID") {
            return response;
        }

        match self.service.create_loan(
            &BorrowerId::from(request.borrower_id.as_str()),
            request.principal_amount,
            request.interest_rate,
            request.roi_rate,
            actor,
        ) {
            Ok((loan_id, state)) => {
                GenericResponse::ok(Some(CreateLoanResponse { loan_id, state }))
            }
            Err(err) => err.into(),
        }
    }

    pub fn update_loan_state(
        &self,
        loan_id: &str,
        request: &UpdateLoanStateRequest,
        actor: &ActorId,
    ) -> GenericResponse<()> {
        if let Err(response) = required(loan_id, "Loan ID") {
            return response;
        }

        match self
            .service
            .update_loan_state(&LoanId::from(loan_id), &request.state, actor)
        {
            Ok(()) => GenericResponse::ok(None),
            Err(err) => err.into(),
        }
    }

    pub fn create_loan_investment(
        &self,
        loan_id: &str,
        request: &CreateLoanInvestmentRequest,
        actor: &ActorId,
    ) -> GenericResponse<CreateLoanInvestmentResponse> {
        if let Err(response) = required(loan_id, "Loan ID") {
            return response;
        }
        if let Err(response) = required(&request.investor_id, "Investor ID") {
            return response;
        }

        match self.service.create_loan_investment(
            &LoanId::from(loan_id),
            &InvestorId::from(request.investor_id.as_str()),
            request.investment_amount,
            actor,
        ) {
            Ok(investment_id) => {
                GenericResponse::ok(Some(CreateLoanInvestmentResponse { investment_id }))
            }
            Err(err) => err.into(),
        }
    }

    pub fn attach_evidence(
        &self,
        loan_id: &str,
        evidence: &Evidence,
        actor: &ActorId,
    ) -> GenericResponse<()> {
        if let Err(response) = required(loan_id, "Loan ID") {
            return response;
        }

        match self
            .service
            .attach_evidence(&LoanId::from(loan_id), evidence, actor)
        {
            Ok(()) => GenericResponse::ok(None),
            Err(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn named_errors_map_to_client_classes() {
        assert_eq!(LoanError::LoanNotFound.class(), ErrorClass::NotFound);
        assert_eq!(LoanError::BorrowerNotFound.class().status_code(), 404);
        assert_eq!(
            LoanError::LoanStateTransitionNotAllowed {
                from: LoanState::Proposed,
                to: LoanState::Invested,
            }
            .class(),
            ErrorClass::InvalidRequest
        );
        assert_eq!(LoanError::InvestmentAlreadyExists.class().status_code(), 400);

        let late = LoanError::EvidenceNotAccepted {
            kind: "site_visit",
            state: LoanState::Approved,
        };
        assert_eq!(late.class(), ErrorClass::InvalidRequest);
        assert_eq!(
            late.to_string(),
            "site_visit evidence is not accepted while the loan is approved"
        );
    }

    #[test]
    fn storage_failures_collapse_to_internal() {
        let err: LoanError = StoreError::Encode("bad bytes".into()).into();
        let response: GenericResponse<()> = err.into();

        assert_eq!(response.code, 500);
        assert_eq!(response.message, "Internal Server Error");
        let body = response.error.unwrap();
        assert_eq!(body.message, "Something wrong in the system!");
        assert!(body.detail.contains("bad bytes"));
    }

    #[test]
    fn user_message_ignores_payload() {
        let a = LoanError::LoanStateInvalid("foo".into());
        let b = LoanError::LoanStateInvalid("bar".into());
        assert_eq!(a.user_message(), b.user_message());
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn success_envelope_omits_empty_fields() {
        let response: GenericResponse<()> = GenericResponse::ok(None);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json, serde_json::json!({ "code": 200, "message": "OK" }));
    }

    #[test]
    fn requests_use_camel_case_wire_names() {
        let request: CreateLoanRequest = decode_request::<_, ()>(
            r#"{"borrowerID":"borrower1xyz","principalAmount":5000000,"interestRate":1200,"roiRate":900}"#,
        )
        .unwrap();
        assert_eq!(request.principal_amount, 5_000_000);
        assert_eq!(request.roi_rate, 900);

        let rejected = decode_request::<CreateLoanInvestmentRequest, ()>(r#"{"investorID":1}"#)
            .unwrap_err();
        assert_eq!(rejected.code, 400);
        assert_eq!(rejected.error.unwrap().message, "Request body invalid");
    }
}
