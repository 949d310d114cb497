//! Customer registry example with a local key directory.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use custodia::prelude::*;
use custodia_key_file::{FileKms, CURRENT_KEY_ALIAS};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let key_dir = PathBuf::from("./example_keys");
    let kms = if key_dir.exists() { FileKms::open(&key_dir)? } else { FileKms::init(&key_dir)? };
    println!("Using KEK {} from {}", kms.current_kek_id()?, key_dir.display());

    let settings = Settings::new("example-salt").with_kms_key_id(CURRENT_KEY_ALIAS);
    let store = Arc::new(MemoryRecordStore::new());
    let service = CustomerService::from_settings(Arc::new(kms), Arc::clone(&store), &settings)?;

    let created = service
        .create(NewCustomer {
            first_name: "Jane".to_string(),
            last_name: "Smith".to_string(),
            document_number: "987.654.321-00".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1985, 5, 20).ok_or("bad date")?,
            email: "jane.smith@example.com".to_string(),
            phone_number: "11987654321".to_string(),
            address: Address {
                street: "Avenida Paulista".to_string(),
                house_number: "1578".to_string(),
                city: "São Paulo".to_string(),
                state: "SP".to_string(),
                postal_code: "01310200".to_string(),
                country: "Brazil".to_string(),
            },
        })
        .await?;

    let stored = store.get(&created.id).await?.ok_or("record missing")?;
    println!("Stored email hash:       {}", stored.email_hash.as_str());
    println!("Stored email ciphertext: {}", stored.email_ciphertext.as_str());

    let found = service.find_by_email("JANE.SMITH@example.com").await?;
    println!("\n{}", serde_json::to_string_pretty(&CustomerView::from(&found))?);

    Ok(())
}
