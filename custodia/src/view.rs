//! Presentation form of a customer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::format;
use crate::record::{CustomerId, PlaintextRecord};

/// A decrypted customer with display formatting applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerView {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub document_number: String,
    pub date_of_birth: NaiveDate,
    pub email: String,
    pub phone_number: String,
    pub address: AddressView,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressView {
    pub street: String,
    pub house_number: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl From<&PlaintextRecord> for CustomerView {
    fn from(record: &PlaintextRecord) -> Self {
        let address = &record.address;
        Self {
            id: record.id,
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            document_number: format::document_number(&record.document_number),
            date_of_birth: record.date_of_birth,
            email: record.email.clone(),
            phone_number: format::phone_number(&record.phone_number),
            address: AddressView {
                street: address.street.clone(),
                house_number: address.house_number.clone(),
                city: address.city.clone(),
                state: address.state.clone(),
                postal_code: format::postal_code(&address.postal_code),
                country: address.country.clone(),
            },
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
