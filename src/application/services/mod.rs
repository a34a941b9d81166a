pub mod engine;
pub mod faq;
pub mod scanner;
pub mod templates;

pub use engine::DecisionEngine;
pub use faq::FaqService;
pub use scanner::ScanService;
pub use templates::TemplateService;
