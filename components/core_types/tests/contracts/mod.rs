//! Contract tests for core_types

mod test_contract_compliance;
