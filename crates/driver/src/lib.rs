pub mod chrome;
pub mod context;
pub mod driver;
pub mod layout;
pub mod session;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use chrome::{launch_options, HeadlessChromeSession};
pub use context::{FlowContext, FlowState, StateTransition};
pub use driver::{FlowDriver, FlowTimings};
pub use layout::FormLayout;
pub use session::{BrowserError, BrowserSession, Control, Interaction, InteractionError, Locator};
