pub mod stamp_request;
