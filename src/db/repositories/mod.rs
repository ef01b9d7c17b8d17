pub mod potholes;

pub use potholes::PotholesRepository;
