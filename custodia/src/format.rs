//! Display formats for Brazilian document numbers, phone numbers and
//! postal codes.
//!
//! Values are stored in canonical (digits-only) form where that matters
//! for indexing; these helpers only shape output. Inputs whose digit count
//! matches no known layout are returned unchanged.

/// Strips every character that is not an ASCII digit.
#[must_use]
pub fn unformat(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Formats a CPF (`000.000.000-00`) or CNPJ (`00.000.000/0000-00`).
#[must_use]
pub fn document_number(value: &str) -> String {
    let d = unformat(value);
    match d.len() {
        11 => format!("{}.{}.{}-{}", &d[..3], &d[3..6], &d[6..9], &d[9..]),
        14 => format!("{}.{}.{}/{}-{}", &d[..2], &d[2..5], &d[5..8], &d[8..12], &d[12..]),
        _ => value.to_string(),
    }
}

/// Formats a landline (`(00) 0000-0000`) or mobile (`(00) 00000-0000`) number.
#[must_use]
pub fn phone_number(value: &str) -> String {
    let d = unformat(value);
    match d.len() {
        10 => format!("({}) {}-{}", &d[..2], &d[2..6], &d[6..]),
        11 => format!("({}) {}-{}", &d[..2], &d[2..7], &d[7..]),
        _ => value.to_string(),
    }
}

/// Formats a CEP (`00000-000`).
#[must_use]
pub fn postal_code(value: &str) -> String {
    let d = unformat(value);
    if d.len() == 8 {
        format!("{}-{}", &d[..5], &d[5..])
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unformat() {
        assert_eq!(unformat("123.456.789-00"), "12345678900");
        assert_eq!(unformat("(11) 98765-4321"), "11987654321");
        assert_eq!(unformat("no digits"), "");
    }

    #[test]
    fn test_document_number_cpf() {
        assert_eq!(document_number("12345678900"), "123.456.789-00");
        assert_eq!(document_number("123.456.789-00"), "123.456.789-00");
    }

    #[test]
    fn test_document_number_cnpj() {
        assert_eq!(document_number("12345678000195"), "12.345.678/0001-95");
    }

    #[test]
    fn test_document_number_unknown_length() {
        assert_eq!(document_number("987654321"), "987654321");
    }

    #[test]
    fn test_phone_number() {
        assert_eq!(phone_number("1132654321"), "(11) 3265-4321");
        assert_eq!(phone_number("11987654321"), "(11) 98765-4321");
        assert_eq!(phone_number("555-1234"), "555-1234");
    }

    #[test]
    fn test_postal_code() {
        assert_eq!(postal_code("01310100"), "01310-100");
        assert_eq!(postal_code("62704"), "62704");
    }
}
