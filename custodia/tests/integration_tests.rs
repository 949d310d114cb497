//! Integration tests for custodia with the file-backed oracle.

use std::sync::Arc;

use chrono::NaiveDate;
use custodia::prelude::*;
use custodia_key_file::{FileKms, CURRENT_KEY_ALIAS};
use tempfile::TempDir;

type Service = CustomerService<FileKms, MemoryRecordStore>;

fn settings() -> Settings {
    Settings::new("integration-salt").with_kms_key_id(CURRENT_KEY_ALIAS)
}

fn setup(temp_dir: &TempDir) -> (Service, Arc<FileKms>, Arc<MemoryRecordStore>) {
    let kms = Arc::new(FileKms::init(temp_dir.path()).expect("Failed to initialize keys"));
    let store = Arc::new(MemoryRecordStore::new());
    let service = CustomerService::from_settings(Arc::clone(&kms), Arc::clone(&store), &settings())
        .expect("Failed to build service");
    (service, kms, store)
}

fn customer(document_number: &str, email: &str) -> NewCustomer {
    NewCustomer {
        first_name: "Jane".to_string(),
        last_name: "Smith".to_string(),
        document_number: document_number.to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1985, 5, 20).unwrap(),
        email: email.to_string(),
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

#[tokio::test]
async fn test_customer_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (service, _, store) = setup(&temp_dir);

    let created = service.create(customer("987.654.321-00", "jane@example.com")).await.unwrap();
    assert_eq!(created.document_number, "98765432100");

    let by_doc = service.find_by_document_number("98765432100").await.unwrap();
    let by_email = service.find_by_email("JANE@example.com").await.unwrap();
    assert_eq!(by_doc, created);
    assert_eq!(by_email, created);

    let update = CustomerUpdate {
        first_name: "Janet".to_string(),
        last_name: created.last_name.clone(),
        date_of_birth: created.date_of_birth,
        email: "janet@example.com".to_string(),
        phone_number: created.phone_number.clone(),
        address: created.address.clone(),
    };
    let updated = service.update(created.id, update).await.unwrap();
    assert_eq!(service.get(created.id).await.unwrap(), updated);
    assert_eq!(service.list().await.unwrap(), vec![updated]);

    service.delete(created.id).await.unwrap();
    assert!(store.is_empty());
    assert!(service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stored_record_holds_no_plaintext() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (service, _, store) = setup(&temp_dir);

    let created = service.create(customer("98765432100", "jane@example.com")).await.unwrap();
    let at_rest = store.get(&created.id).await.unwrap().unwrap();
    let json = serde_json::to_string(&at_rest).unwrap();

    for secret in ["98765432100", "jane@example.com", "11987654321", "Elm Street", "Springfield", "62704"] {
        assert!(!json.contains(secret), "{secret} stored in clear");
    }
    assert!(json.contains("\"documentNumberHash\""));
    assert!(json.contains("\"emailCiphertext\""));
    assert!(json.contains("\"Jane\""));
}

#[tokio::test]
async fn test_duplicates_rejected_in_any_formatting() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (service, _, store) = setup(&temp_dir);

    service.create(customer("98765432100", "jane@example.com")).await.unwrap();

    let by_doc = service.create(customer("987.654.321-00", "other@example.com")).await;
    assert!(matches!(by_doc, Err(ServiceError::Validation(m)) if m[0].contains("document number")));

    let by_email = service.create(customer("12345678900", "Jane@Example.COM")).await;
    assert!(matches!(by_email, Err(ServiceError::Validation(m)) if m[0].contains("email")));

    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_check_then_write_is_not_atomic() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let kms = Arc::new(FileKms::init(temp_dir.path()).unwrap());
    let store = Arc::new(MemoryRecordStore::new());
    let codec = SensitiveFieldCodec::from_settings(kms, &settings()).unwrap();
    let guard = DuplicateGuard::new(Arc::clone(&store), codec.hasher().clone());

    // Two writers both pass the guard before either writes.
    guard.check("98765432100", "a@example.com").await.unwrap();
    guard.check("98765432100", "b@example.com").await.unwrap();

    let first = PlaintextRecord {
        id: CustomerId::generate(),
        first_name: "A".to_string(),
        last_name: "A".to_string(),
        document_number: "98765432100".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        email: "a@example.com".to_string(),
        phone_number: "1133334444".to_string(),
        address: customer("", "").address,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    let second = PlaintextRecord {
        id: CustomerId::generate(),
        email: "b@example.com".to_string(),
        ..first.clone()
    };
    store.put(codec.encode(&first).await.unwrap()).await.unwrap();
    store.put(codec.encode(&second).await.unwrap()).await.unwrap();

    let digest = codec.hasher().hash("98765432100").unwrap();
    assert_eq!(store.index_len(HashIndex::DocumentNumber, &digest), 2);

    // Later checks see the collision and lookups return the first writer.
    let result = guard.check("98765432100", "c@example.com").await;
    assert!(matches!(result, Err(Error::DuplicateDocumentNumber)));
    let found = store.get_by_hash(HashIndex::DocumentNumber, &digest).await.unwrap().unwrap();
    assert_eq!(found.id, first.id);
}

#[tokio::test]
async fn test_unknown_key_writes_nothing() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let kms = Arc::new(FileKms::init(temp_dir.path()).unwrap());
    let store = Arc::new(MemoryRecordStore::new());
    let settings = Settings::new("integration-salt").with_kms_key_id("kek_v7");
    let service = CustomerService::from_settings(kms, Arc::clone(&store), &settings).unwrap();

    let result = service.create(customer("98765432100", "jane@example.com")).await;
    assert!(matches!(result, Err(ServiceError::Operational(Error::KeyUnavailable(_)))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_records_survive_key_rotation() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (service, kms, store) = setup(&temp_dir);

    let before = service.create(customer("98765432100", "jane@example.com")).await.unwrap();
    assert_eq!(kms.create_kek().unwrap(), "kek_v2");
    let after = service.create(customer("12345678000195", "acme@example.com")).await.unwrap();

    // A fresh oracle over the same directory reads both generations.
    let reopened = Arc::new(FileKms::open(temp_dir.path()).unwrap());
    let service = CustomerService::from_settings(reopened, store, &settings()).unwrap();
    let mut ids: Vec<_> = service.list().await.unwrap().into_iter().map(|c| c.id).collect();
    let mut expected = vec![before.id, after.id];
    ids.sort();
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_salt_change_breaks_lookup_not_decryption() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (service, kms, store) = setup(&temp_dir);
    let created = service.create(customer("98765432100", "jane@example.com")).await.unwrap();

    let other = Settings::new("rotated-salt").with_kms_key_id(CURRENT_KEY_ALIAS);
    let service = CustomerService::from_settings(kms, store, &other).unwrap();

    assert!(matches!(service.find_by_email("jane@example.com").await, Err(ServiceError::NotFound)));
    assert_eq!(service.get(created.id).await.unwrap(), created);
}

#[tokio::test]
async fn test_view_of_created_customer() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (service, _, _) = setup(&temp_dir);

    let created = service.create(customer("12345678000195", "acme@example.com")).await.unwrap();
    let view = CustomerView::from(&created);
    assert_eq!(view.document_number, "12.345.678/0001-95");
    assert_eq!(view.phone_number, "(11) 98765-4321");
}
