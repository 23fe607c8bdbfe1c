mod interval;
mod resolver;

pub use interval::expand_date_value;
pub use resolver::{
    DependencyContext, DependencyPoller, DependencyResolver, combine, finish,
};
