pub mod test_session;

pub use test_session::TestSession;
