//! Router integration tests
//!
//! Registry events flowing through the router's watch loop into the route
//! table, and the admission rules applied before proxying.

mod routing;
