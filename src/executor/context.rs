use crate::config::Profile;
use crate::driver::DriverProvider;
use crate::store::Store;

/// Collaborators an executor may use during one attempt.
pub struct ExecutionContext<'a> {
    pub store: &'a dyn Store,
    pub drivers: &'a dyn DriverProvider,
    pub profile: &'a Profile,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(store: &'a dyn Store, drivers: &'a dyn DriverProvider, profile: &'a Profile) -> Self {
        Self {
            store,
            drivers,
            profile,
        }
    }
}
