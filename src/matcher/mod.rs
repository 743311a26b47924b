pub mod path_matcher;
