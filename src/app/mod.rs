pub mod survey;

pub use survey::{survey, survey_and_stop, NodeReport, PayloadReport, SurveyReport};
