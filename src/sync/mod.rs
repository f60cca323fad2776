mod priority_mutex;


pub use priority_mutex::*;
