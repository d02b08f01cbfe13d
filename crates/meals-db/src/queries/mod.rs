pub mod children;
pub mod choices;
pub mod meals;
pub mod parents;
pub mod registrations;
