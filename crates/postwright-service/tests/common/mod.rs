#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub mod server_utils {
    use axum_test::TestServer;
    use postwright_service::create_app;
    use postwright_service::test_helpers::{StubClients, TestHarness};

    pub fn create_test_server() -> (TestServer, TestHarness) {
        create_test_server_with(StubClients::default())
    }

    pub fn create_test_server_with(stubs: StubClients) -> (TestServer, TestHarness) {
        let harness = TestHarness::with_stubs(stubs);
        let app = create_app(harness.app_state());
        let server = TestServer::new(app).unwrap();
        (server, harness)
    }
}
