mod parameters;
mod series;
mod state;

pub use parameters::Parameter;
pub use series::TimeSeries;
pub use state::CompartmentState;
