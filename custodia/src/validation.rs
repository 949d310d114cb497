//! Input rules for customer creation and update.
//!
//! Every rule is checked and all violations are returned together.

use chrono::NaiveDate;

use crate::format;
use crate::record::Address;

struct Violations(Vec<String>);

impl Violations {
    fn required(&mut self, label: &str, value: &str, max_len: usize) {
        if value.trim().is_empty() {
            self.0.push(format!("{label} is required."));
        } else if value.chars().count() > max_len {
            self.0.push(format!("{label} cannot exceed {max_len} characters."));
        }
    }

    fn email(&mut self, value: &str) {
        self.required("Email", value, 100);
        if value.trim().is_empty() {
            return;
        }
        let valid = value
            .trim()
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty() && !domain.contains('@'));
        if !valid {
            self.0.push("Invalid email format.".to_string());
        }
    }

    fn address(&mut self, address: &Address) {
        self.required("Street", &address.street, 100);
        self.required("House number", &address.house_number, 10);
        self.required("City", &address.city, 50);
        self.required("State", &address.state, 50);
        self.required("Postal code", &address.postal_code, 20);
        self.required("Country", &address.country, 50);
    }

    fn date_of_birth(&mut self, date_of_birth: NaiveDate, today: NaiveDate) {
        if date_of_birth >= today {
            self.0.push("Date of birth must be in the past.".to_string());
        }
    }
}

/// Checks the fields shared by creation and update.
#[allow(clippy::too_many_arguments)]
fn common(
    v: &mut Violations,
    first_name: &str,
    last_name: &str,
    date_of_birth: NaiveDate,
    email: &str,
    phone_number: &str,
    address: &Address,
    today: NaiveDate,
) {
    v.required("First name", first_name, 50);
    v.required("Last name", last_name, 50);
    v.date_of_birth(date_of_birth, today);
    v.email(email);
    v.required("Phone number", phone_number, 15);
    v.address(address);
}

/// Validates a creation request.
#[must_use]
pub fn new_customer(input: &crate::service::NewCustomer, today: NaiveDate) -> Vec<String> {
    let mut v = Violations(Vec::new());
    common(
        &mut v,
        &input.first_name,
        &input.last_name,
        input.date_of_birth,
        &input.email,
        &input.phone_number,
        &input.address,
        today,
    );
    match format::unformat(&input.document_number).len() {
        11 | 14 => {}
        0 => v.0.push("Document number is required.".to_string()),
        _ => v.0.push("Document number must have 11 (CPF) or 14 (CNPJ) digits.".to_string()),
    }
    v.0
}

/// Validates an update request.
#[must_use]
pub fn customer_update(input: &crate::service::CustomerUpdate, today: NaiveDate) -> Vec<String> {
    let mut v = Violations(Vec::new());
    common(
        &mut v,
        &input.first_name,
        &input.last_name,
        input.date_of_birth,
        &input.email,
        &input.phone_number,
        &input.address,
        today,
    );
    v.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::NewCustomer;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn valid() -> NewCustomer {
        NewCustomer {
            first_name: "Jane".to_string(),
            last_name: "Smith".to_string(),
            document_number: "987.654.321-00".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1985, 5, 20).unwrap(),
            email: "jane.smith@example.com".to_string(),
            phone_number: "11987654321".to_string(),
            address: Address {
                street: "Elm Street".to_string(),
                house_number: "42".to_string(),
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                postal_code: "62704".to_string(),
                country: "USA".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_input() {
        assert!(new_customer(&valid(), today()).is_empty());
    }

    #[test]
    fn test_collects_all_violations() {
        let mut input = valid();
        input.first_name = String::new();
        input.email = "not-an-email".to_string();
        input.address.house_number = "12345678901".to_string();

        let errors = new_customer(&input, today());
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors.contains(&"First name is required.".to_string()));
        assert!(errors.contains(&"Invalid email format.".to_string()));
        assert!(errors.contains(&"House number cannot exceed 10 characters.".to_string()));
    }

    #[test]
    fn test_document_number_digit_count() {
        let mut input = valid();
        input.document_number = "987654321".to_string();
        assert_eq!(
            new_customer(&input, today()),
            vec!["Document number must have 11 (CPF) or 14 (CNPJ) digits.".to_string()]
        );

        input.document_number = "12.345.678/0001-95".to_string();
        assert!(new_customer(&input, today()).is_empty());
    }

    #[test]
    fn test_date_of_birth_must_be_past() {
        let mut input = valid();
        input.date_of_birth = today();
        assert_eq!(new_customer(&input, today()), vec!["Date of birth must be in the past.".to_string()]);
    }

    #[test]
    fn test_length_counts_characters() {
        let mut input = valid();
        input.address.city = "ã".repeat(50);
        assert!(new_customer(&input, today()).is_empty());
    }
}
