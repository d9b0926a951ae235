mod authenticator;
mod load_balancer_api;

pub use authenticator::Authenticator;
pub use load_balancer_api::LoadBalancerApi;
