pub mod db;

pub use db::{
    apply_labels, create_account, create_db, facets, get_account, get_account_by_name,
    get_all_accounts, get_record, get_suggestion, get_vendor, get_vendor_by_id, insert_record,
    insert_suggestion, labeled_records, list_records, list_suggestions, record_exists,
    restore_record, set_suggestion_status, set_vendor_payload, stats_summary, update_record,
    upsert_vendor, vendors_for_account, DbPool, Facets, LabeledRecord, NewRecord, RecordFilter,
    StoreError, Summary,
};
