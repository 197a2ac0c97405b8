pub mod backend;
pub mod chunker;
pub mod dispatcher;
pub mod display;
pub mod events;
pub mod history;
pub mod markov;
pub mod pipeline;
pub mod prompt;
pub mod session;
pub mod stop;
pub mod topic;
