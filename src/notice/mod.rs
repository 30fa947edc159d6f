/// Notice model, exception capability and notice builder
pub mod builder;
pub mod exception;
pub mod host;
pub mod model;

pub use builder::NoticeBuilder;
pub use exception::{error_chain, Captured, Exception};
pub use host::{HostResolver, SystemResolver};
pub use model::{
    Backtrace, BacktraceLine, ErrorEntry, KeyValuePair, Notice, NotifierInfo, RequestContext,
    ServerEnvironment, VarList, IP_ADDRESS_KEY,
};
