mod bound_sql;
pub use bound_sql::BoundSql;

mod discriminator;
pub use discriminator::{Discriminator, DiscriminatorBuilder};

mod environment;
pub use environment::Environment;

mod mapped_statement;
pub use mapped_statement::{
    MappedStatement, MappedStatementBuilder, SqlCommandType, StatementType,
};

mod parameter_map;
pub use parameter_map::ParameterMap;

mod parameter_mapping;
pub use parameter_mapping::{ParamMode, ParameterMapping, ParameterMappingBuilder};

mod result_map;
pub use result_map::{ResultMap, ResultMapBuilder};

mod result_mapping;
pub use result_mapping::{ResultFlag, ResultMapping, ResultMappingBuilder};

mod sql_source;
pub use sql_source::{SqlSource, StaticSqlSource};
