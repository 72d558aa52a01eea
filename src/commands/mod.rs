pub mod evaluate;
pub mod inspect;
